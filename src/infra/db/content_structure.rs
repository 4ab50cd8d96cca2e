use async_trait::async_trait;
use sqlx::types::Json;
use tracing::debug;

use crate::{
    application::repos::{CollectionModelConfig, ContentStructureRepo, RepoError},
    domain::structure::{ContentNode, ContentNodeUpdate},
};

use super::PostgresRepositories;
use super::util::{is_safe_table_name, map_sqlx_error, quote_identifier};

#[derive(sqlx::FromRow)]
struct ContentNodeRow {
    id: String,
    path: String,
    name: String,
    icon: String,
    sort_order: i32,
    is_collection: bool,
}

impl From<ContentNodeRow> for ContentNode {
    fn from(row: ContentNodeRow) -> Self {
        Self {
            id: row.id,
            path: row.path,
            name: row.name,
            icon: row.icon,
            order: row.sort_order,
            is_collection: row.is_collection,
        }
    }
}

#[async_trait]
impl ContentStructureRepo for PostgresRepositories {
    async fn wait_ready(&self) -> Result<(), RepoError> {
        self.health_check()
            .await
            .map_err(|err| RepoError::Unavailable(err.to_string()))
    }

    async fn get_content_structure(&self) -> Result<Vec<ContentNode>, RepoError> {
        let rows = sqlx::query_as::<_, ContentNodeRow>(
            "SELECT id, path, name, icon, sort_order, is_collection \
             FROM content_structure ORDER BY path",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ContentNode::from).collect())
    }

    async fn create_content_structure(&self, node: ContentNode) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO content_structure (id, path, name, icon, sort_order, is_collection) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&node.id)
        .bind(&node.path)
        .bind(&node.name)
        .bind(&node.icon)
        .bind(node.order)
        .bind(node.is_collection)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_content_structure(
        &self,
        id: &str,
        update: ContentNodeUpdate,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE content_structure \
             SET path = $2, name = $3, icon = $4, sort_order = $5, is_collection = $6, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&update.path)
        .bind(&update.name)
        .bind(&update.icon)
        .bind(update.order)
        .bind(update.is_collection)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_content_structure(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM content_structure WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn create_collection_model(
        &self,
        config: CollectionModelConfig,
    ) -> Result<(), RepoError> {
        if !is_safe_table_name(&config.model_name) {
            return Err(RepoError::InvalidInput {
                message: format!("unsupported model name `{}`", config.model_name),
            });
        }

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO collection_models (model_name, collection_id, name, schema) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (model_name) DO UPDATE \
             SET collection_id = EXCLUDED.collection_id, name = EXCLUDED.name, \
                 schema = EXCLUDED.schema, updated_at = now()",
        )
        .bind(&config.model_name)
        .bind(&config.id)
        .bind(&config.name)
        .bind(Json(&config.schema))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id TEXT PRIMARY KEY, \
                data JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             )",
            quote_identifier(&config.model_name)
        );
        sqlx::query(&ddl)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(model = %config.model_name, "Collection model materialized");
        Ok(())
    }
}
