//! # Namespace Lifecycle Manager
//!
//! Drives each user from `NO_NAMESPACE` through `NAMESPACE_REQUESTED` to
//! `NAMESPACE_ASSIGNED`, and caches the namespace configuration once the head
//! node has issued it.
//!
//! State only moves forward. Every write that changes `namespace_status` goes
//! through a guarded repository call, so a stale read can never move a user back.

use std::sync::Arc;

use domains::{
    fold_email, namespace_candidates, Confirmation, DomainError, HeadNode, NamespaceAck,
    NamespaceStatus, Outcome, ProfileUpdate, Result, UserRecord, UserRepo,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::report::{ItemError, Stage};
use crate::retry::RetryPolicy;

/// Outcome of one "advance all eligible users" pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub namespaces_requested: Vec<String>,
    pub configs_cached: Vec<String>,
    pub errors: Vec<ItemError>,
}

pub struct NamespaceLifecycle {
    users: Arc<dyn UserRepo>,
    head_node: Arc<dyn HeadNode>,
    retry: RetryPolicy,
}

impl NamespaceLifecycle {
    pub fn new(users: Arc<dyn UserRepo>, head_node: Arc<dyn HeadNode>, retry: RetryPolicy) -> Self {
        Self { users, head_node, retry }
    }

    /// Find-or-create on first login.
    #[instrument(skip(self))]
    pub async fn register_user(&self, email: &str) -> Result<UserRecord> {
        let email = fold_email(email);
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, host)| !local.is_empty() && !host.is_empty() && !host.contains('@'));
        if !well_formed {
            return Err(DomainError::Validation(format!("{email:?} isn't an email address")));
        }
        self.users.insert_if_absent(UserRecord::new(email)).await
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<UserRecord>> {
        self.users.find_by_email(&fold_email(email)).await
    }

    pub async fn agree_to_terms(&self, email: &str) -> Result<UserRecord> {
        self.update(email, ProfileUpdate { agreed_to_terms: Some(true), ..Default::default() })
            .await
    }

    /// Un-approving a user leaves any namespace already requested in place.
    pub async fn set_approved(&self, email: &str, approved: bool) -> Result<UserRecord> {
        let user = self
            .update(email, ProfileUpdate { approved: Some(approved), ..Default::default() })
            .await?;
        if !approved && user.namespace_status != NamespaceStatus::NoNamespace {
            warn!(email = %user.email, namespace = ?user.namespace, "approval withdrawn; namespace stays reserved");
        }
        Ok(user)
    }

    pub async fn set_administrator(&self, email: &str, administrator: bool) -> Result<UserRecord> {
        self.update(email, ProfileUpdate { is_administrator: Some(administrator), ..Default::default() })
            .await
    }

    async fn update(&self, email: &str, update: ProfileUpdate) -> Result<UserRecord> {
        let email = fold_email(email);
        self.users
            .update_profile(&email, update)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {email}")))
    }

    /// First slug derived from `email` that no other user holds.
    pub async fn next_free_namespace(&self, email: &str) -> Result<String> {
        let email = fold_email(email);
        for candidate in namespace_candidates(&email) {
            let holders = self.users.find_by_namespace(&candidate).await?;
            if holders.iter().all(|u| u.email == email) {
                return Ok(candidate);
            }
        }
        unreachable!("namespace candidates are unbounded")
    }

    /// `NO_NAMESPACE` → `NAMESPACE_REQUESTED` for one approved user.
    #[instrument(skip(self, user), fields(email = %user.email))]
    pub async fn request_namespace(&self, user: &UserRecord) -> Result<String> {
        if !user.approved || user.namespace_status != NamespaceStatus::NoNamespace {
            return Err(DomainError::Validation(format!(
                "user {} is not awaiting a namespace",
                user.email
            )));
        }

        let namespace = self.next_free_namespace(&user.email).await?;
        let ack = self
            .retry
            .run("head node create_namespace", || self.head_node.create_namespace(&namespace))
            .await?;

        match ack {
            NamespaceAck::Acknowledged => {
                self.users.assign_namespace(&user.email, &namespace).await?;
                info!(namespace = %namespace, "namespace requested");
                Ok(namespace)
            }
            NamespaceAck::Failure { reason } => Err(DomainError::Connectivity(format!(
                "namespace creation failed for {namespace}: {reason}"
            ))),
        }
    }

    /// Head-node callback: `NAMESPACE_REQUESTED` → `NAMESPACE_ASSIGNED`.
    #[instrument(skip(self))]
    pub async fn confirm_namespace(&self, namespace: &str) -> Result<Confirmation> {
        if namespace.is_empty() {
            return Err(DomainError::Validation("no namespace sent".into()));
        }
        let mut holders = self.users.find_by_namespace(namespace).await?;
        match holders.len() {
            0 => Err(DomainError::NotFound(format!("no records for namespace {namespace} found"))),
            1 => {
                let user = holders.remove(0);
                self.users.advance_status(&user.email, NamespaceStatus::NamespaceAssigned).await?;
                info!(email = %user.email, "namespace confirmed");
                Ok(Confirmation {
                    outcome: Outcome::Success,
                    reason: format!("Namespace {namespace} confirmed!"),
                })
            }
            n => {
                error!(holders = n, "namespace held by more than one user; operator attention needed");
                Err(DomainError::Consistency(format!(
                    "{n} records for namespace {namespace} found"
                )))
            }
        }
    }

    /// Serves the cached configuration, fetching it once if the namespace is
    /// assigned but nothing is cached yet.
    #[instrument(skip(self))]
    pub async fn config_for(&self, email: &str) -> Result<String> {
        let email = fold_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {email}")))?;

        if let Some(config) = user.config {
            return Ok(config);
        }
        if user.namespace_status != NamespaceStatus::NamespaceAssigned {
            return Err(DomainError::NotFound(format!("no namespace assigned to {email} yet")));
        }
        let namespace = user.namespace.ok_or_else(|| {
            DomainError::Consistency(format!("user {email} is assigned but has no namespace"))
        })?;
        self.cache_config(&email, &namespace).await
    }

    async fn cache_config(&self, email: &str, namespace: &str) -> Result<String> {
        let fetched = self
            .retry
            .run("head node fetch_config", || self.head_node.fetch_config(namespace))
            .await?;
        let config = fetched.ok_or_else(|| {
            DomainError::NotFound(format!("head node has no config for namespace {namespace}"))
        })?;
        let cached = self.users.store_config(email, &config).await?;
        info!(namespace, "namespace config cached");
        Ok(cached)
    }

    /// Requests namespaces for approved users without one, then caches configs
    /// for assigned users without one. Every failure is per-user.
    #[instrument(skip(self))]
    pub async fn advance_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();

        match self.users.list_by_status(NamespaceStatus::NoNamespace).await {
            Ok(users) => {
                for user in users.iter().filter(|u| u.approved) {
                    match self.request_namespace(user).await {
                        Ok(namespace) => report.namespaces_requested.push(namespace),
                        Err(err) => {
                            warn!(email = %user.email, error = %err, "namespace request failed");
                            report.errors.push(ItemError::new(Stage::NamespaceCreation, &user.email, &err));
                        }
                    }
                }
            }
            Err(err) => report.errors.push(ItemError::new(Stage::NamespaceCreation, "users", &err)),
        }

        match self.users.list_by_status(NamespaceStatus::NamespaceAssigned).await {
            Ok(users) => {
                for user in users.iter().filter(|u| !u.has_config) {
                    let Some(namespace) = user.namespace.as_deref() else {
                        let err = DomainError::Consistency(format!(
                            "user {} is assigned but has no namespace",
                            user.email
                        ));
                        report.errors.push(ItemError::new(Stage::ConfigFetch, &user.email, &err));
                        continue;
                    };
                    match self.cache_config(&user.email, namespace).await {
                        Ok(_) => report.configs_cached.push(namespace.to_string()),
                        Err(err) => {
                            warn!(namespace, error = %err, "config fetch failed");
                            report.errors.push(ItemError::new(Stage::ConfigFetch, namespace, &err));
                        }
                    }
                }
            }
            Err(err) => report.errors.push(ItemError::new(Stage::ConfigFetch, "users", &err)),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockHeadNode, MockUserRepo, RemoteError};
    use mockall::predicate::eq;

    fn approved(email: &str) -> UserRecord {
        let mut user = UserRecord::new(email);
        user.approved = true;
        user
    }

    fn with_namespace(email: &str, namespace: &str, status: NamespaceStatus) -> UserRecord {
        let mut user = approved(email);
        user.namespace = Some(namespace.into());
        user.namespace_status = status;
        user
    }

    fn lifecycle(users: MockUserRepo, head_node: MockHeadNode) -> NamespaceLifecycle {
        NamespaceLifecycle::new(Arc::new(users), Arc::new(head_node), RetryPolicy::default())
    }

    #[tokio::test]
    async fn slug_collisions_append_a_counter() {
        let mut users = MockUserRepo::new();
        users
            .expect_find_by_namespace()
            .with(eq("a-b-c-x"))
            .returning(|ns| Ok(vec![with_namespace("other@x", ns, NamespaceStatus::NamespaceAssigned)]));
        users
            .expect_find_by_namespace()
            .with(eq("a-b-c-x0"))
            .returning(|ns| Ok(vec![with_namespace("third@x", ns, NamespaceStatus::NamespaceRequested)]));
        users.expect_find_by_namespace().with(eq("a-b-c-x1")).returning(|_| Ok(vec![]));

        let namespace = lifecycle(users, MockHeadNode::new())
            .next_free_namespace("A.B.C@x")
            .await
            .unwrap();
        assert_eq!(namespace, "a-b-c-x1");
    }

    #[tokio::test]
    async fn acknowledged_request_assigns_the_slug() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_namespace().returning(|_| Ok(vec![]));
        users
            .expect_assign_namespace()
            .with(eq("a@b.io"), eq("a-b-io"))
            .times(1)
            .returning(|email, ns| Ok(with_namespace(email, ns, NamespaceStatus::NamespaceRequested)));
        let mut head = MockHeadNode::new();
        head.expect_create_namespace()
            .with(eq("a-b-io"))
            .returning(|_| Ok(NamespaceAck::Acknowledged));

        let namespace = lifecycle(users, head).request_namespace(&approved("a@b.io")).await.unwrap();
        assert_eq!(namespace, "a-b-io");
    }

    #[tokio::test]
    async fn failed_request_leaves_state_alone() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_namespace().returning(|_| Ok(vec![]));
        users.expect_assign_namespace().never();
        let mut head = MockHeadNode::new();
        head.expect_create_namespace()
            .times(1)
            .returning(|_| Ok(NamespaceAck::Failure { reason: "quota".into() }));

        let err = lifecycle(users, head).request_namespace(&approved("a@b.io")).await.unwrap_err();
        assert!(matches!(err, DomainError::Connectivity(_)));
    }

    #[tokio::test]
    async fn unreadable_ack_is_not_an_acknowledgement() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_namespace().returning(|_| Ok(vec![]));
        users.expect_assign_namespace().never();
        let mut head = MockHeadNode::new();
        head.expect_create_namespace()
            .times(1)
            .returning(|_| Err(RemoteError::Malformed("namespace ack status \"pending\"".into())));

        let err = lifecycle(users, head).request_namespace(&approved("a@b.io")).await.unwrap_err();
        assert!(matches!(err, DomainError::Connectivity(_)));
    }

    #[tokio::test]
    async fn unapproved_users_are_not_eligible() {
        let mut head = MockHeadNode::new();
        head.expect_create_namespace().never();
        let err = lifecycle(MockUserRepo::new(), head)
            .request_namespace(&UserRecord::new("a@b.io"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn confirmation_of_single_holder_succeeds() {
        let mut users = MockUserRepo::new();
        users
            .expect_find_by_namespace()
            .with(eq("a-b-c"))
            .returning(|ns| Ok(vec![with_namespace("a@b.c", ns, NamespaceStatus::NamespaceRequested)]));
        users
            .expect_advance_status()
            .with(eq("a@b.c"), eq(NamespaceStatus::NamespaceAssigned))
            .times(1)
            .returning(|email, to| Ok(with_namespace(email, "a-b-c", to)));

        let confirmation = lifecycle(users, MockHeadNode::new())
            .confirm_namespace("a-b-c")
            .await
            .unwrap();
        assert_eq!(confirmation.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn confirmation_with_two_holders_is_a_consistency_error() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_namespace().returning(|ns| {
            Ok(vec![
                with_namespace("a@b.c", ns, NamespaceStatus::NamespaceRequested),
                with_namespace("d@e.f", ns, NamespaceStatus::NamespaceRequested),
            ])
        });
        users.expect_advance_status().never();

        let err = lifecycle(users, MockHeadNode::new())
            .confirm_namespace("a-b-c")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Consistency(_)));
    }

    #[tokio::test]
    async fn cached_config_is_served_without_fetching() {
        let mut users = MockUserRepo::new();
        users.expect_find_by_email().returning(|email| {
            let mut user = with_namespace(email, "a-b-c", NamespaceStatus::NamespaceAssigned);
            user.has_config = true;
            user.config = Some("cached".into());
            Ok(Some(user))
        });
        let mut head = MockHeadNode::new();
        head.expect_fetch_config().never();

        assert_eq!(lifecycle(users, head).config_for("A@B.C").await, Ok("cached".to_string()));
    }

    #[tokio::test]
    async fn advance_all_records_per_user_failures_and_continues() {
        let mut users = MockUserRepo::new();
        users
            .expect_list_by_status()
            .with(eq(NamespaceStatus::NoNamespace))
            .returning(|_| Ok(vec![approved("down@x.io"), approved("up@x.io"), UserRecord::new("idle@x.io")]));
        users
            .expect_list_by_status()
            .with(eq(NamespaceStatus::NamespaceAssigned))
            .returning(|_| Ok(vec![with_namespace("done@x.io", "done-x-io", NamespaceStatus::NamespaceAssigned)]));
        users.expect_find_by_namespace().returning(|_| Ok(vec![]));
        users
            .expect_assign_namespace()
            .returning(|email, ns| Ok(with_namespace(email, ns, NamespaceStatus::NamespaceRequested)));
        users
            .expect_store_config()
            .with(eq("done@x.io"), eq("kubeconfig"))
            .returning(|_, cfg| Ok(cfg.to_string()));

        let mut head = MockHeadNode::new();
        head.expect_create_namespace()
            .with(eq("down-x-io"))
            .times(2)
            .returning(|_| Err(RemoteError::Unreachable("timeout".into())));
        head.expect_create_namespace()
            .with(eq("up-x-io"))
            .returning(|_| Ok(NamespaceAck::Acknowledged));
        head.expect_fetch_config().returning(|_| Ok(Some("kubeconfig".into())));

        let report = lifecycle(users, head).advance_all().await;
        assert_eq!(report.namespaces_requested, vec!["up-x-io".to_string()]);
        assert_eq!(report.configs_cached, vec!["done-x-io".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].subject, "down@x.io");
        assert_eq!(report.errors[0].stage, Stage::NamespaceCreation);
    }
}
