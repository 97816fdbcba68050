mod common;

use common::*;

use creator_market::error::AppError;
use creator_market::models::{ProjectStatus, ProposalStatus, Role, TransactionType};
use creator_market::project::{self, Payout};
use creator_market::proposal;
use creator_market::store::{MemoryStore, PageRequest, Store};

const ALL_ROWS: PageRequest = PageRequest { skip: 0, limit: 100 };

#[actix_web::test]
async fn creating_a_project_checks_but_does_not_spend_credits() {
    let store = MemoryStore::new();
    let (client, profile) = seed_client(&store, "ada", 1000).await;

    let created = project::create_project(&store, &client, project_request("Launch video", 500))
        .await
        .unwrap();

    assert_eq!(created.status, ProjectStatus::Unapproved);
    assert_eq!(created.client, client.user_id);
    assert_eq!(created.client_name, "ada");
    let after = store.client_profile(&profile.id).await.unwrap().unwrap();
    assert_eq!(after.credits, 1000);
}

#[actix_web::test]
async fn creating_a_project_over_budget_is_refused() {
    let store = MemoryStore::new();
    let (client, _) = seed_client(&store, "ada", 100).await;

    let err = project::create_project(&store, &client, project_request("Too big", 500))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientCredits { balance: 100, required: 500 }));
    assert!(project::projects_for_user(&store, &client).await.unwrap().is_empty());
}

#[actix_web::test]
async fn project_fields_are_validated() {
    let store = MemoryStore::new();
    let (client, _) = seed_client(&store, "ada", 1000).await;

    let mut missing_title = project_request("x", 10);
    missing_title.title = Some("   ".to_string());
    let mut zero_budget = project_request("x", 10);
    zero_budget.budget = Some(0);
    let mut no_deadline = project_request("x", 10);
    no_deadline.deadline = None;

    for request in [missing_title, zero_budget, no_deadline] {
        let err = project::create_project(&store, &client, request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);
    }
}

#[actix_web::test]
async fn only_clients_with_a_profile_create_projects() {
    let store = MemoryStore::new();
    let (freelancer, _) = seed_freelancer(&store, "fay", &["audio"]).await;
    let err = project::create_project(&store, &freelancer, project_request("x", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
}

#[actix_web::test]
async fn managers_only_see_projects_of_their_clients() {
    let store = MemoryStore::new();
    let (client_a, _) = seed_client(&store, "a", 1000).await;
    let (client_b, _) = seed_client(&store, "b", 1000).await;
    let manager = seed_manager(&store, "pm", &[&client_a.user_id]).await;

    let mine = project::create_project(&store, &client_a, project_request("A", 100)).await.unwrap();
    project::create_project(&store, &client_b, project_request("B", 100)).await.unwrap();

    let visible = project::unapproved_projects(&store, &manager).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, mine.id);
}

#[actix_web::test]
async fn accepting_opens_the_project_and_creates_its_group_chat() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;

    assert_eq!(setup.project.assigned_manager.as_deref(), Some(setup.manager.user_id.as_str()));
    let chat = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();
    assert!(chat.is_group_chat);
    assert_eq!(chat.group_admin.as_deref(), Some(setup.manager.user_id.as_str()));
    assert!(chat.has_member(&setup.client.user_id));
    assert!(chat.has_member(&setup.manager.user_id));

    for user_id in [&setup.client.user_id, &setup.manager.user_id] {
        let user = store.user(user_id).await.unwrap().unwrap();
        assert_eq!(user.active_projects, vec![setup.project.id.clone()]);
    }
}

#[actix_web::test]
async fn manager_of_another_client_cannot_decide() {
    let store = MemoryStore::new();
    let (client, _) = seed_client(&store, "a", 1000).await;
    let stranger = seed_manager(&store, "pm", &[]).await;
    let created = project::create_project(&store, &client, project_request("A", 100)).await.unwrap();

    let err = project::accept_project(&store, &stranger, &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
    let still = store.project(&created.id).await.unwrap().unwrap();
    assert_eq!(still.status, ProjectStatus::Unapproved);
}

#[actix_web::test]
async fn rejection_is_persisted_and_final() {
    let store = MemoryStore::new();
    let (client, _) = seed_client(&store, "a", 1000).await;
    let manager = seed_manager(&store, "pm", &[&client.user_id]).await;
    let created = project::create_project(&store, &client, project_request("A", 100)).await.unwrap();

    let rejected = project::reject_project(&store, &manager, &created.id).await.unwrap();
    assert_eq!(rejected.status, ProjectStatus::Rejected);
    assert_eq!(
        store.project(&created.id).await.unwrap().unwrap().status,
        ProjectStatus::Rejected
    );

    let err = project::accept_project(&store, &manager, &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
    let err = project::complete_project(&store, &manager, &created.id, vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_) | AppError::StateConflict(_)));
}

#[actix_web::test]
async fn accepting_a_proposal_joins_project_user_and_chat() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (freelancer, _) = seed_freelancer(&store, "fay", &["video editing"]).await;

    let accepted = hire(&store, &setup.manager, &setup.project.id, &freelancer).await;
    assert_eq!(accepted.status, ProposalStatus::Accepted);

    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert!(project.has_freelancer(&freelancer.user_id));
    assert_eq!(project.status, ProjectStatus::Ongoing);
    let user = store.user(&freelancer.user_id).await.unwrap().unwrap();
    assert!(user.active_projects.contains(&project.id));
    let chat = store.group_chat_for_project(&project.id).await.unwrap().unwrap();
    assert!(chat.has_member(&freelancer.user_id));

    let detail = project::project_detail(&store, &freelancer, &project.id).await.unwrap();
    assert_eq!(detail.proposals.len(), 1);
    assert_eq!(detail.proposals[0].status, ProposalStatus::Accepted);
}

#[actix_web::test]
async fn duplicate_proposals_are_refused() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (freelancer, _) = seed_freelancer(&store, "fay", &[]).await;

    proposal::send_proposal(&store, &setup.manager, proposal_request(&setup.project.id, &freelancer.user_id))
        .await
        .unwrap();
    let err = proposal::send_proposal(&store, &setup.manager, proposal_request(&setup.project.id, &freelancer.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[actix_web::test]
async fn only_the_assigned_manager_sends_proposals() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let other = seed_manager(&store, "pm2", &[&setup.client.user_id]).await;
    let (freelancer, _) = seed_freelancer(&store, "fay", &[]).await;

    let err = proposal::send_proposal(&store, &other, proposal_request(&setup.project.id, &freelancer.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
}

#[actix_web::test]
async fn answered_proposals_are_terminal() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (freelancer, _) = seed_freelancer(&store, "fay", &[]).await;
    let (other, _) = seed_freelancer(&store, "gus", &[]).await;

    let sent = proposal::send_proposal(&store, &setup.manager, proposal_request(&setup.project.id, &freelancer.user_id))
        .await
        .unwrap();
    let err = proposal::accept_proposal(&store, &other, &sent.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    let rejected = proposal::reject_proposal(&store, &freelancer, &sent.id).await.unwrap();
    assert_eq!(rejected.status, ProposalStatus::Rejected);
    let err = proposal::accept_proposal(&store, &freelancer, &sent.id).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert!(!project.has_freelancer(&freelancer.user_id));
    assert_eq!(project.status, ProjectStatus::Open);
}

#[actix_web::test]
async fn completion_settles_budget_and_closes_counters() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, fay_profile) = seed_freelancer(&store, "fay", &[]).await;
    let (gus, gus_profile) = seed_freelancer(&store, "gus", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;
    hire(&store, &setup.manager, &setup.project.id, &gus).await;

    let report = project::complete_project(
        &store,
        &setup.manager,
        &setup.project.id,
        vec![
            Payout { freelancer_id: fay.user_id.clone(), amount: 300 },
            Payout { freelancer_id: gus.user_id.clone(), amount: 200 },
        ],
    )
    .await
    .unwrap();

    assert_eq!(report.project.status, ProjectStatus::Completed);
    assert_eq!(report.payouts.len(), 2);
    assert!(report.client_debit.is_some());

    let client = store.client_profile(&setup.client_profile.id).await.unwrap().unwrap();
    assert_eq!(client.credits, 500);
    assert_eq!(store.freelancer_profile(&fay_profile.id).await.unwrap().unwrap().credits, 300);
    assert_eq!(store.freelancer_profile(&gus_profile.id).await.unwrap().unwrap().credits, 200);

    let debits = store.transactions(&client.id, ALL_ROWS).await.unwrap();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].kind, TransactionType::Debit);
    assert_eq!(debits[0].amount, 500);
    let credits = store.transactions(&fay_profile.id, ALL_ROWS).await.unwrap();
    assert_eq!(credits[0].kind, TransactionType::Credit);
    assert_eq!(credits[0].project_id.as_deref(), Some(setup.project.id.as_str()));

    for user_id in [&setup.client.user_id, &setup.manager.user_id, &fay.user_id, &gus.user_id] {
        let user = store.user(user_id).await.unwrap().unwrap();
        assert!(!user.active_projects.contains(&setup.project.id));
        assert_eq!(user.total_projects, 1);
    }
}

#[actix_web::test]
async fn project_without_freelancers_completes_without_settlement() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;

    let report = project::complete_project(&store, &setup.manager, &setup.project.id, vec![])
        .await
        .unwrap();
    assert_eq!(report.project.status, ProjectStatus::Completed);
    assert!(report.client_debit.is_none());
    let client = store.client_profile(&setup.client_profile.id).await.unwrap().unwrap();
    assert_eq!(client.credits, 1000);

    let err = project::complete_project(&store, &setup.manager, &setup.project.id, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[actix_web::test]
async fn unapproved_projects_cannot_complete() {
    let store = MemoryStore::new();
    let (client, _) = seed_client(&store, "a", 1000).await;
    let admin = seed_admin(&store).await;
    let created = project::create_project(&store, &client, project_request("A", 100)).await.unwrap();

    let err = project::complete_project(&store, &admin, &created.id, vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[actix_web::test]
async fn bad_split_changes_nothing() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, fay_profile) = seed_freelancer(&store, "fay", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;

    let err = project::complete_project(
        &store,
        &setup.manager,
        &setup.project.id,
        vec![Payout { freelancer_id: fay.user_id.clone(), amount: 400 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Ongoing);
    assert_eq!(store.freelancer_profile(&fay_profile.id).await.unwrap().unwrap().credits, 0);
}

#[actix_web::test]
async fn overflowing_split_is_refused_and_changes_nothing() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, fay_profile) = seed_freelancer(&store, "fay", &[]).await;
    let (gus, _) = seed_freelancer(&store, "gus", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;
    hire(&store, &setup.manager, &setup.project.id, &gus).await;

    let err = project::complete_project(
        &store,
        &setup.manager,
        &setup.project.id,
        vec![
            Payout { freelancer_id: fay.user_id.clone(), amount: i64::MAX },
            Payout { freelancer_id: gus.user_id.clone(), amount: 1 },
        ],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Ongoing);
    assert_eq!(store.freelancer_profile(&fay_profile.id).await.unwrap().unwrap().credits, 0);
    assert_eq!(store.client_profile(&setup.client_profile.id).await.unwrap().unwrap().credits, 1000);
}

#[actix_web::test]
async fn client_short_of_credits_blocks_the_whole_completion() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 500, 500).await;
    let (fay, fay_profile) = seed_freelancer(&store, "fay", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;
    // The budget was checked at creation but never reserved.
    creator_market::credits::remove_credits(&store, &setup.client.user_id, 100)
        .await
        .unwrap();

    let err = project::complete_project(
        &store,
        &setup.manager,
        &setup.project.id,
        vec![Payout { freelancer_id: fay.user_id.clone(), amount: 500 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientCredits { balance: 400, required: 500 }));

    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Ongoing);
    assert_eq!(store.freelancer_profile(&fay_profile.id).await.unwrap().unwrap().credits, 0);
    let fay_user = store.user(&fay.user_id).await.unwrap().unwrap();
    assert!(fay_user.active_projects.contains(&project.id));
    assert!(store.transactions(&fay_profile.id, ALL_ROWS).await.unwrap().is_empty());
}

#[actix_web::test]
async fn failure_midway_through_completion_rolls_everything_back() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, fay_profile) = seed_freelancer(&store, "fay", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;

    // Fail after the status change, counters and client debit were staged.
    store.fail_next_apply_at(6);
    let err = project::complete_project(
        &store,
        &setup.manager,
        &setup.project.id,
        vec![Payout { freelancer_id: fay.user_id.clone(), amount: 500 }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Ongoing);
    let client = store.client_profile(&setup.client_profile.id).await.unwrap().unwrap();
    assert_eq!(client.credits, 1000);
    assert!(store.transactions(&client.id, ALL_ROWS).await.unwrap().is_empty());
    assert_eq!(store.freelancer_profile(&fay_profile.id).await.unwrap().unwrap().credits, 0);
    let manager = store.user(&setup.manager.user_id).await.unwrap().unwrap();
    assert_eq!(manager.total_projects, 0);

    // The same completion succeeds once the store recovers.
    project::complete_project(
        &store,
        &setup.manager,
        &setup.project.id,
        vec![Payout { freelancer_id: fay.user_id.clone(), amount: 500 }],
    )
    .await
    .unwrap();
}

#[actix_web::test]
async fn failure_while_accepting_a_proposal_leaves_no_partial_join() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, _) = seed_freelancer(&store, "fay", &[]).await;
    let sent = proposal::send_proposal(&store, &setup.manager, proposal_request(&setup.project.id, &fay.user_id))
        .await
        .unwrap();

    store.fail_next_apply_at(4);
    proposal::accept_proposal(&store, &fay, &sent.id).await.unwrap_err();

    let proposal = store.proposal(&sent.id).await.unwrap().unwrap();
    assert_eq!(proposal.status, ProposalStatus::Unapproved);
    let project = store.project(&setup.project.id).await.unwrap().unwrap();
    assert!(!project.has_freelancer(&fay.user_id));
    assert_eq!(project.status, ProjectStatus::Open);
    let chat = store.group_chat_for_project(&project.id).await.unwrap().unwrap();
    assert!(!chat.has_member(&fay.user_id));
}

#[actix_web::test]
async fn projects_are_listed_per_role() {
    let store = MemoryStore::new();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, _) = seed_freelancer(&store, "fay", &[]).await;
    let (idle, _) = seed_freelancer(&store, "idle", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;

    for actor in [&setup.client, &setup.manager, &fay] {
        let listed = project::projects_for_user(&store, actor).await.unwrap();
        assert_eq!(listed.len(), 1, "{:?}", actor.role);
    }
    assert!(project::projects_for_user(&store, &idle).await.unwrap().is_empty());
    let err = project::project_detail(&store, &idle, &setup.project.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
    assert_eq!(idle.role, Role::Freelancer);
}
