use std::sync::Arc;

use super::common::*;
use crate::config::MarketplaceConfig;
use crate::workflows::maintenance::alerts::RecordingAlertPublisher;
use crate::workflows::maintenance::domain::{
    CancellationActor, CategoryId, LandlordDecision, LandlordId, MaintenanceStatus,
    PaymentStatus, QuoteStatus, RequestFilter, TenantId, WhitelistInput,
};
use crate::workflows::maintenance::error::MaintenanceError;
use crate::workflows::maintenance::memory::InMemoryMaintenanceStore;
use crate::workflows::maintenance::service::MaintenanceService;

#[test]
fn completion_waits_for_payment_then_frees_a_slot() {
    let (service, store, alerts) = build_service();
    let request = assigned_request(&service, "vendor-a");
    let subscription_id = request.subscription_id.clone().expect("booked subscription");
    assert_eq!(stored_subscription(&store, &subscription_id).current_jobs, 1);

    assert!(matches!(
        service
            .lifecycle()
            .complete(&request.id, &vendor("vendor-a"), Vec::new()),
        Err(MaintenanceError::PaymentNotCompleted)
    ));
    assert_status(
        &stored_request(&store, &request.id),
        MaintenanceStatus::Assigned,
    );

    settle_payment(&service, &request.id);
    let completed = service
        .lifecycle()
        .complete(
            &request.id,
            &vendor("vendor-a"),
            vec!["https://files.example.com/after.jpg".to_string()],
        )
        .expect("completion succeeds");
    assert_status(&completed, MaintenanceStatus::Completed);
    assert_eq!(completed.end_attachments.len(), 1);
    assert_eq!(stored_subscription(&store, &subscription_id).current_jobs, 0);

    assert!(matches!(
        service
            .lifecycle()
            .complete(&request.id, &vendor("vendor-a"), Vec::new()),
        Err(MaintenanceError::Conflict(_))
    ));
    assert_eq!(stored_subscription(&store, &subscription_id).current_jobs, 0);
    assert!(alerts
        .templates()
        .contains(&"maintenance_completed".to_string()));
}

#[test]
fn payment_gate_applies_in_every_status() {
    let (service, _, _) = build_service();
    let open = create_request(&service);
    assert!(matches!(
        service
            .lifecycle()
            .complete(&open.id, &vendor("vendor-a"), Vec::new()),
        Err(MaintenanceError::PaymentNotCompleted)
    ));

    settle_payment(&service, &open.id);
    assert!(matches!(
        service
            .lifecycle()
            .complete(&open.id, &vendor("vendor-a"), Vec::new()),
        Err(MaintenanceError::Unauthorized(_))
    ));
}

#[test]
fn quote_jobs_release_only_the_slot_they_booked() {
    let (service, store, _) = build_service();
    let request = create_request(&service);
    let subscription = subscribe(&service, "vendor-a", 100);
    service
        .capacity()
        .increment_jobs(&subscription.id)
        .expect("vendor already busy elsewhere");
    let quote = service
        .quotes()
        .submit(&request.id, quote_submission("vendor-a", 100))
        .expect("quote");
    service
        .quotes()
        .accept(&quote.id, &landlord())
        .expect("accepted");

    let assigned = stored_request(&store, &request.id);
    assert_eq!(assigned.subscription_id, Some(subscription.id.clone()));
    assert_eq!(stored_subscription(&store, &subscription.id).current_jobs, 2);

    settle_payment(&service, &request.id);
    service
        .lifecycle()
        .complete(&request.id, &vendor("vendor-a"), Vec::new())
        .expect("completed");
    assert_eq!(stored_subscription(&store, &subscription.id).current_jobs, 1);
}

#[test]
fn unsubscribed_quote_winner_completes_without_touching_capacity() {
    let (service, store, _) = build_service();
    let request = create_request(&service);
    let quote = service
        .quotes()
        .submit(&request.id, quote_submission("vendor-z", 90))
        .expect("quote");
    service
        .quotes()
        .accept(&quote.id, &landlord())
        .expect("accepted");
    assert_eq!(stored_request(&store, &request.id).subscription_id, None);

    let other = create_request(&service);
    let subscription = subscribe(&service, "vendor-z", 90);
    service
        .assignment()
        .direct_accept(&other.id, &vendor("vendor-z"))
        .expect("direct job");

    settle_payment(&service, &request.id);
    service
        .lifecycle()
        .complete(&request.id, &vendor("vendor-z"), Vec::new())
        .expect("completed");
    assert_eq!(stored_subscription(&store, &subscription.id).current_jobs, 1);
}

#[test]
fn vendor_never_exceeds_the_job_limit_across_both_assignment_paths() {
    let (service, store, _) = build_service();
    let subscription = subscribe(&service, "vendor-a", 100);
    let limit = service.capacity().job_limit() as usize;
    let active_jobs = || {
        service
            .list(&RequestFilter {
                vendor_id: Some(vendor("vendor-a")),
                status: Some(MaintenanceStatus::Assigned),
                ..RequestFilter::default()
            })
            .expect("list")
            .len()
    };

    let direct: Vec<_> = (0..limit)
        .map(|_| {
            let request = create_request(&service);
            service
                .assignment()
                .direct_accept(&request.id, &vendor("vendor-a"))
                .expect("direct job within limit")
        })
        .collect();
    assert_eq!(active_jobs(), limit);

    let quoted = create_request(&service);
    let quote = service
        .quotes()
        .submit(&quoted.id, quote_submission("vendor-a", 100))
        .expect("quote");
    assert!(matches!(
        service.quotes().accept(&quote.id, &landlord()),
        Err(MaintenanceError::CapacityExceeded(_))
    ));
    assert_status(
        &stored_request(&store, &quoted.id),
        MaintenanceStatus::Unassigned,
    );
    assert_eq!(
        service.quotes().quote(&quote.id).expect("quote").status,
        QuoteStatus::Pending
    );
    assert_eq!(active_jobs(), limit);

    settle_payment(&service, &direct[0].id);
    service
        .lifecycle()
        .complete(&direct[0].id, &vendor("vendor-a"), Vec::new())
        .expect("one direct job done");
    service
        .quotes()
        .accept(&quote.id, &landlord())
        .expect("slot freed for the quote");
    assert_eq!(active_jobs(), limit);

    settle_payment(&service, &quoted.id);
    service
        .lifecycle()
        .complete(&quoted.id, &vendor("vendor-a"), Vec::new())
        .expect("quote job done");
    assert_eq!(active_jobs(), limit - 1);
    assert_eq!(
        stored_subscription(&store, &subscription.id).current_jobs as usize,
        limit - 1
    );

    let refill = create_request(&service);
    service
        .assignment()
        .direct_accept(&refill.id, &vendor("vendor-a"))
        .expect("refills the freed slot");
    let overflow = create_request(&service);
    assert!(matches!(
        service
            .assignment()
            .direct_accept(&overflow.id, &vendor("vendor-a")),
        Err(MaintenanceError::CapacityExceeded(_))
    ));
    assert_eq!(active_jobs(), limit);
}

#[test]
fn only_the_assigned_vendor_completes() {
    let (service, _, _) = build_service();
    let request = assigned_request(&service, "vendor-a");
    settle_payment(&service, &request.id);

    assert!(matches!(
        service
            .lifecycle()
            .complete(&request.id, &vendor("vendor-b"), Vec::new()),
        Err(MaintenanceError::Unauthorized(_))
    ));
}

#[test]
fn settled_payment_cannot_be_reverted() {
    let (service, _, _) = build_service();
    let request = create_request(&service);
    settle_payment(&service, &request.id);

    assert!(matches!(
        service
            .lifecycle()
            .record_payment(&request.id, PaymentStatus::Failed),
        Err(MaintenanceError::InvalidState(_))
    ));
    let again = service
        .lifecycle()
        .record_payment(&request.id, PaymentStatus::Completed)
        .expect("idempotent settle");
    assert_eq!(again.payment_status, PaymentStatus::Completed);
}

#[test]
fn pause_and_resume_toggle_the_suspension_flag() {
    let (service, _, alerts) = build_service();
    let request = assigned_request(&service, "vendor-a");
    let resume_at = days_from_now(3);

    assert!(matches!(
        service
            .lifecycle()
            .pause(&request.id, &vendor("vendor-a"), days_from_now(-1)),
        Err(MaintenanceError::Validation(_))
    ));
    assert!(matches!(
        service
            .lifecycle()
            .pause(&request.id, &vendor("vendor-b"), resume_at),
        Err(MaintenanceError::Unauthorized(_))
    ));

    let paused = service
        .lifecycle()
        .pause(&request.id, &vendor("vendor-a"), resume_at)
        .expect("paused");
    assert!(paused.work_suspended);
    assert_eq!(paused.resume_at, Some(resume_at));
    assert_status(&paused, MaintenanceStatus::Assigned);

    assert!(matches!(
        service
            .lifecycle()
            .pause(&request.id, &vendor("vendor-a"), resume_at),
        Err(MaintenanceError::InvalidState(_))
    ));

    let resumed = service
        .lifecycle()
        .resume(&request.id, &vendor("vendor-a"))
        .expect("resumed");
    assert!(!resumed.work_suspended);
    assert_eq!(resumed.resume_at, None);
    assert!(matches!(
        service.lifecycle().resume(&request.id, &vendor("vendor-a")),
        Err(MaintenanceError::InvalidState(_))
    ));

    let templates = alerts.templates();
    assert!(templates.contains(&"work_paused".to_string()));
    assert!(templates.contains(&"work_resumed".to_string()));
}

#[test]
fn pause_requires_an_assigned_request() {
    let (service, _, _) = build_service();
    let request = create_request(&service);
    assert!(matches!(
        service
            .lifecycle()
            .pause(&request.id, &vendor("vendor-a"), days_from_now(2)),
        Err(MaintenanceError::InvalidState(_))
    ));
}

#[test]
fn cancellation_needs_both_parties_once_assigned() {
    let (service, store, alerts) = build_service();
    let request = assigned_request(&service, "vendor-a");
    let tenant = CancellationActor::Tenant(TenantId::new(TENANT));

    let first = service
        .lifecycle()
        .request_cancellation(&request.id, tenant.clone(), Some("moving out".to_string()))
        .expect("tenant consent");
    assert!(!first.cancelled);
    assert_status(&first.request, MaintenanceStatus::Assigned);
    assert!(first.request.cancellation_pending());
    assert_eq!(first.request.cancel_reason.as_deref(), Some("moving out"));

    // A lone consent never expires or escalates.
    for _ in 0..3 {
        let repeat = service
            .lifecycle()
            .request_cancellation(&request.id, tenant.clone(), None)
            .expect("repeat consent");
        assert!(!repeat.cancelled);
    }
    assert_status(
        &stored_request(&store, &request.id),
        MaintenanceStatus::Assigned,
    );

    let second = service
        .lifecycle()
        .request_cancellation(
            &request.id,
            CancellationActor::Vendor(vendor("vendor-a")),
            None,
        )
        .expect("vendor consent");
    assert!(second.cancelled);
    assert_status(&second.request, MaintenanceStatus::Cancel);
    assert_eq!(second.request.vendor_id, Some(vendor("vendor-a")));

    let templates = alerts.templates();
    assert!(templates.contains(&"cancellation_requested".to_string()));
    assert!(templates.contains(&"maintenance_cancelled".to_string()));

    assert!(matches!(
        service
            .lifecycle()
            .request_cancellation(&request.id, tenant, None),
        Err(MaintenanceError::InvalidState(_))
    ));
}

#[test]
fn tenant_alone_cancels_an_unassigned_request() {
    let (service, _, _) = build_service();
    let request = create_request(&service);

    assert!(matches!(
        service.lifecycle().request_cancellation(
            &request.id,
            CancellationActor::Vendor(vendor("vendor-a")),
            None,
        ),
        Err(MaintenanceError::Unauthorized(_))
    ));
    assert!(matches!(
        service.lifecycle().request_cancellation(
            &request.id,
            CancellationActor::Tenant(TenantId::new("tenant-9")),
            None,
        ),
        Err(MaintenanceError::Unauthorized(_))
    ));

    let outcome = service
        .lifecycle()
        .request_cancellation(
            &request.id,
            CancellationActor::Tenant(TenantId::new(TENANT)),
            None,
        )
        .expect("tenant consent");
    assert!(outcome.cancelled);
    assert_status(&outcome.request, MaintenanceStatus::Cancel);
}

#[test]
fn reschedule_spends_the_allowance_and_keeps_history() {
    let (service, _, alerts) = build_service();
    let request = assigned_request(&service, "vendor-a");

    for day in 1..=3 {
        let updated = service
            .lifecycle()
            .reschedule(&request.id, days_from_now(day))
            .expect("reschedule allowed");
        assert_eq!(updated.reschedule_remaining, 3 - day as u8);
        assert_status(&updated, MaintenanceStatus::Assigned);
    }

    match service
        .lifecycle()
        .reschedule(&request.id, days_from_now(10))
    {
        Err(MaintenanceError::Validation(message)) => {
            assert_eq!(message, "maximum reschedules reached")
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    let history = service
        .reschedule_history(&request.id)
        .expect("history readable");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].old_date, None);
    assert_eq!(history[1].old_date, Some(history[0].new_date));
    assert_eq!(
        alerts
            .templates()
            .iter()
            .filter(|template| template.as_str() == "maintenance_rescheduled")
            .count(),
        3
    );
}

#[test]
fn reschedule_rejects_past_dates_and_open_requests() {
    let (service, _, _) = build_service();
    let open = create_request(&service);
    assert!(matches!(
        service.lifecycle().reschedule(&open.id, days_from_now(2)),
        Err(MaintenanceError::InvalidState(_))
    ));

    let assigned = assigned_request(&service, "vendor-a");
    assert!(matches!(
        service
            .lifecycle()
            .reschedule(&assigned.id, days_from_now(-2)),
        Err(MaintenanceError::Validation(_))
    ));
}

#[test]
fn landlord_decides_whitelisted_requests_once() {
    let (service, _, _) = build_service();
    service
        .whitelist()
        .create(
            &landlord(),
            WhitelistInput {
                category_id: CategoryId::new(PLUMBING),
                subcategory_id: None,
                property_id: None,
                apartment_id: None,
            },
        )
        .expect("whitelist entry");
    let request = create_request(&service);

    assert!(matches!(
        service.lifecycle().decide(
            &request.id,
            &LandlordId::new(OTHER_LANDLORD),
            LandlordDecision::Approved
        ),
        Err(MaintenanceError::Unauthorized(_))
    ));

    let decided = service
        .lifecycle()
        .decide(&request.id, &landlord(), LandlordDecision::Approved)
        .expect("decision recorded");
    assert_eq!(decided.landlord_decision, Some(LandlordDecision::Approved));
    assert_status(&decided, MaintenanceStatus::Unassigned);

    assert!(matches!(
        service
            .lifecycle()
            .decide(&request.id, &landlord(), LandlordDecision::Declined),
        Err(MaintenanceError::InvalidState(_))
    ));
}

#[test]
fn marketplace_requests_take_no_landlord_decision() {
    let (service, _, _) = build_service();
    let request = create_request(&service);
    assert!(matches!(
        service
            .lifecycle()
            .decide(&request.id, &landlord(), LandlordDecision::Approved),
        Err(MaintenanceError::InvalidState(_))
    ));
    assert!(matches!(
        service
            .lifecycle()
            .decide(&request.id, &landlord(), LandlordDecision::Pending),
        Err(MaintenanceError::Validation(_))
    ));
}

#[test]
fn deleted_requests_disappear_but_assigned_ones_stay() {
    let (service, _, _) = build_service();
    let assigned = assigned_request(&service, "vendor-a");
    assert!(matches!(
        service.lifecycle().delete_request(&assigned.id),
        Err(MaintenanceError::InvalidState(_))
    ));

    let open = create_request(&service);
    service
        .lifecycle()
        .delete_request(&open.id)
        .expect("open request deletable");
    assert!(matches!(
        service.get(&open.id),
        Err(MaintenanceError::NotFound { .. })
    ));
    assert!(matches!(
        service.lifecycle().delete_request(&open.id),
        Err(MaintenanceError::NotFound { .. })
    ));
}

#[test]
fn observed_transitions_follow_the_lifecycle_edges() {
    let (service, store, _) = build_service();
    let completed = assigned_request(&service, "vendor-a");
    let cancelled = create_request(&service);

    let mut observed = vec![(MaintenanceStatus::Unassigned, completed.status)];
    settle_payment(&service, &completed.id);
    let done = service
        .lifecycle()
        .complete(&completed.id, &vendor("vendor-a"), Vec::new())
        .expect("completed");
    observed.push((completed.status, done.status));

    let outcome = service
        .lifecycle()
        .request_cancellation(
            &cancelled.id,
            CancellationActor::Tenant(TenantId::new(TENANT)),
            None,
        )
        .expect("cancelled");
    observed.push((cancelled.status, outcome.request.status));

    for (from, to) in observed {
        assert!(from.can_transition_to(to), "illegal edge {from} -> {to}");
    }
    assert_status(
        &stored_request(&store, &done.id),
        MaintenanceStatus::Completed,
    );
}

#[test]
fn former_owner_loses_the_decision_after_a_transfer() {
    let directory = Arc::new(TransferableDirectory::new());
    let service = MaintenanceService::new(
        Arc::new(InMemoryMaintenanceStore::default()),
        directory.clone(),
        Arc::new(RecordingAlertPublisher::default()),
        MarketplaceConfig::default(),
    );
    service
        .whitelist()
        .create(
            &landlord(),
            WhitelistInput {
                category_id: CategoryId::new(PLUMBING),
                subcategory_id: None,
                property_id: None,
                apartment_id: None,
            },
        )
        .expect("whitelist entry");
    let request = service
        .routing()
        .create_request(submission(PLUMBING))
        .expect("request created");
    assert!(request.handle_by_landlord);

    directory.transfer(PROPERTY, OTHER_LANDLORD);

    assert!(matches!(
        service
            .lifecycle()
            .decide(&request.id, &landlord(), LandlordDecision::Approved),
        Err(MaintenanceError::Unauthorized(_))
    ));
    let decided = service
        .lifecycle()
        .decide(
            &request.id,
            &LandlordId::new(OTHER_LANDLORD),
            LandlordDecision::Declined,
        )
        .expect("new owner decides");
    assert_eq!(decided.landlord_decision, Some(LandlordDecision::Declined));
}
