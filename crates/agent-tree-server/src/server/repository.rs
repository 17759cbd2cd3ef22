//! Read access to the agent relation.
//!
//! [`AgentRepository`] is the storage seam; [`SqlAgentRepository`] is its only
//! production implementation and runs one parameterized query per call.

use crate::server::db::Database;
use agent_tree_core::{Error, Result, types::AgentId};
use async_trait::async_trait;

/// Child lookup for the agent hierarchy.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Returns the ids of all agents whose parent is `parent_id`, in the order
    /// the store produced them. No match yields an empty vector.
    async fn get_child_agent_ids(&self, parent_id: AgentId) -> Result<Vec<AgentId>>;
}

const CHILD_AGENT_IDS_QUERY: &str = "SELECT id FROM cc_agent WHERE parent_agent_id = ?";

#[derive(Clone, Debug)]
pub struct SqlAgentRepository {
    db: Database,
}

impl SqlAgentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AgentRepository for SqlAgentRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_child_agent_ids(&self, parent_id: AgentId) -> Result<Vec<AgentId>> {
        // Drivers disagree on the width they report for INT columns, so decode
        // wide and narrow afterwards.
        let rows: Vec<i64> = sqlx::query_scalar(CHILD_AGENT_IDS_QUERY)
            .bind(parent_id)
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter()
            .map(|id| {
                AgentId::try_from(id).map_err(|e| Error::from(sqlx::Error::Decode(Box::new(e))))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_tree_core::types::Agent;
    use core::time::Duration;

    const SEED: [Agent; 10] = [
        Agent::root(1),
        Agent::root(2),
        Agent::root(3),
        Agent::root(4),
        Agent::new(5, 1),
        Agent::new(6, 1),
        Agent::new(7, 2),
        Agent::new(8, 2),
        Agent::new(9, 3),
        Agent::new(10, 4),
    ];

    // A single connection keeps every query on the same in-memory database.
    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:", 1, Duration::from_secs(5))
            .await
            .unwrap()
    }

    async fn seeded_repository(agents: &[Agent]) -> SqlAgentRepository {
        let db = memory_db().await;
        sqlx::query(
            "CREATE TABLE cc_agent (id INTEGER PRIMARY KEY, parent_agent_id INTEGER NOT NULL)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        for agent in agents {
            sqlx::query("INSERT INTO cc_agent (id, parent_agent_id) VALUES (?, ?)")
                .bind(agent.agent_id)
                .bind(agent.parent_agent_id)
                .execute(db.pool())
                .await
                .unwrap();
        }
        SqlAgentRepository::new(db)
    }

    #[tokio::test]
    async fn returns_children_of_each_parent() {
        let repo = seeded_repository(&SEED).await;

        let cases: [(AgentId, &[AgentId]); 4] =
            [(1, &[5, 6]), (2, &[7, 8]), (3, &[9]), (4, &[10])];
        for (parent, expected) in cases {
            let ids = repo.get_child_agent_ids(parent).await.unwrap();
            assert_eq!(ids, expected, "children of {parent}");
        }
    }

    #[tokio::test]
    async fn sentinel_parent_returns_roots() {
        let repo = seeded_repository(&SEED).await;
        let ids = repo.get_child_agent_ids(0).await.unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn leaf_and_unknown_agents_have_no_children() {
        let repo = seeded_repository(&SEED).await;
        assert!(repo.get_child_agent_ids(5).await.unwrap().is_empty());
        assert!(repo.get_child_agent_ids(42).await.unwrap().is_empty());
        assert!(repo.get_child_agent_ids(-1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_table_is_a_storage_error() {
        let repo = SqlAgentRepository::new(memory_db().await);
        let err = repo.get_child_agent_ids(1).await.unwrap_err();
        assert!(matches!(err, Error::Storage(sqlx::Error::Database(_))));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn closed_pool_is_an_unavailable_storage_error() {
        let repo = seeded_repository(&SEED).await;
        repo.db.close().await;
        assert!(repo.db.pool().is_closed());

        let err = repo.get_child_agent_ids(1).await.unwrap_err();
        assert!(matches!(err, Error::Storage(sqlx::Error::PoolClosed)));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn ids_outside_agent_id_range_fail_to_decode() {
        let repo = seeded_repository(&SEED).await;
        sqlx::query("INSERT INTO cc_agent (id, parent_agent_id) VALUES (?, ?)")
            .bind(3_000_000_000_i64)
            .bind(4_i64)
            .execute(repo.db.pool())
            .await
            .unwrap();

        let err = repo.get_child_agent_ids(4).await.unwrap_err();
        assert!(matches!(err, Error::Storage(sqlx::Error::Decode(_))));
    }
}
