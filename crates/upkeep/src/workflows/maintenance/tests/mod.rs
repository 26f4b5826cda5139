mod common;
mod http;
mod lifecycle;
