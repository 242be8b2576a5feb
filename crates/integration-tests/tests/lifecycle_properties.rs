use std::collections::BTreeSet;
use std::sync::Arc;

use domains::{DomainError, MockHeadNode, NamespaceStatus, Outcome, UserRepo};
use integration_tests::{cooperative_head_node, fake_emails, user_repo, BACKENDS};
use services::{NamespaceLifecycle, RetryPolicy};

fn lifecycle(users: Arc<dyn UserRepo>, head: MockHeadNode) -> NamespaceLifecycle {
    NamespaceLifecycle::new(users, Arc::new(head), RetryPolicy::default())
}

async fn approved(lifecycle: &NamespaceLifecycle, email: &str) {
    lifecycle.register_user(email).await.unwrap();
    lifecycle.set_approved(email, true).await.unwrap();
}

#[tokio::test]
async fn colliding_slugs_get_numbered_suffixes() {
    for backend in BACKENDS {
        let users = user_repo(backend).await;
        let lifecycle = lifecycle(users.clone(), cooperative_head_node());

        // three addresses that fold onto the same slug
        for email in ["a.b.c@x", "a-b.c@x", "a.b-c@x"] {
            approved(&lifecycle, email).await;
        }
        let report = lifecycle.advance_all().await;
        assert!(report.errors.is_empty(), "{backend:?}: {:?}", report.errors);

        let slugs: BTreeSet<String> = report.namespaces_requested.into_iter().collect();
        let expected: BTreeSet<String> =
            ["a-b-c-x", "a-b-c-x0", "a-b-c-x1"].into_iter().map(String::from).collect();
        assert_eq!(slugs, expected, "{backend:?}");
    }
}

#[tokio::test]
async fn bulk_users_get_distinct_namespaces() {
    for backend in BACKENDS {
        let users = user_repo(backend).await;
        let lifecycle = lifecycle(users.clone(), cooperative_head_node());
        let emails = fake_emails(25);
        for email in &emails {
            approved(&lifecycle, email).await;
        }

        let report = lifecycle.advance_all().await;
        assert_eq!(report.namespaces_requested.len(), emails.len(), "{backend:?}");
        let distinct: BTreeSet<_> = report.namespaces_requested.iter().collect();
        assert_eq!(distinct.len(), emails.len());

        let requested = users.list_by_status(NamespaceStatus::NamespaceRequested).await.unwrap();
        assert_eq!(requested.len(), emails.len());
    }
}

#[tokio::test]
async fn assigned_users_never_regress() {
    for backend in BACKENDS {
        let users = user_repo(backend).await;
        let lifecycle = lifecycle(users.clone(), cooperative_head_node());
        approved(&lifecycle, "a@b.c").await;
        lifecycle.advance_all().await;
        lifecycle.confirm_namespace("a-b-c").await.unwrap();

        // everything a caller can throw at an assigned user
        lifecycle.set_approved("a@b.c", false).await.unwrap();
        lifecycle.set_approved("a@b.c", true).await.unwrap();
        lifecycle.agree_to_terms("a@b.c").await.unwrap();
        lifecycle.register_user("A@B.C").await.unwrap();
        lifecycle.confirm_namespace("a-b-c").await.unwrap();
        lifecycle.advance_all().await;
        lifecycle.advance_all().await;
        let user = users.find_by_email("a@b.c").await.unwrap().unwrap();
        assert!(lifecycle.request_namespace(&user).await.is_err());
        assert!(users.advance_status("a@b.c", NamespaceStatus::NoNamespace).await.is_ok());
        assert!(users.assign_namespace("a@b.c", "elsewhere").await.is_err());

        let user = users.find_by_email("a@b.c").await.unwrap().unwrap();
        assert_eq!(user.namespace_status, NamespaceStatus::NamespaceAssigned, "{backend:?}");
        assert_eq!(user.namespace.as_deref(), Some("a-b-c"));
        assert!(user.has_config, "{backend:?}");
    }
}

#[tokio::test]
async fn confirmation_assigns_and_unknown_namespace_changes_nothing() {
    for backend in BACKENDS {
        let users = user_repo(backend).await;
        let lifecycle = lifecycle(users.clone(), cooperative_head_node());
        approved(&lifecycle, "a@b.c").await;
        lifecycle.advance_all().await;

        let confirmation = lifecycle.confirm_namespace("a-b-c").await.unwrap();
        assert_eq!(confirmation.outcome, Outcome::Success);

        let before = users.find_by_email("a@b.c").await.unwrap();
        let err = lifecycle.confirm_namespace("missing").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)), "{backend:?}");
        assert_eq!(users.find_by_email("a@b.c").await.unwrap(), before);
        assert_eq!(before.unwrap().namespace_status, NamespaceStatus::NamespaceAssigned);
    }
}

#[tokio::test]
async fn cached_config_is_served_without_refetching() {
    for backend in BACKENDS {
        let users = user_repo(backend).await;
        let mut head = MockHeadNode::new();
        head.expect_create_namespace()
            .returning(|_| Ok(domains::NamespaceAck::Acknowledged));
        head.expect_fetch_config().times(1).returning(|_| Ok(Some("kubeconfig".into())));
        let lifecycle = lifecycle(users.clone(), head);

        approved(&lifecycle, "a@b.c").await;
        lifecycle.advance_all().await;
        lifecycle.confirm_namespace("a-b-c").await.unwrap();

        assert_eq!(lifecycle.config_for("a@b.c").await.unwrap(), "kubeconfig");
        assert_eq!(lifecycle.config_for("a@b.c").await.unwrap(), "kubeconfig", "{backend:?}");
        assert!(lifecycle.advance_all().await.configs_cached.is_empty());
    }
}
