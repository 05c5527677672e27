use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("ANALYSIS_DB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("ANALYSIS_DB_NAMESPACE")
                .unwrap_or_else(|_| "analysis".to_string()),
            database: env::var("ANALYSIS_DB_DATABASE")
                .unwrap_or_else(|_| "runner".to_string()),
            username: env::var("ANALYSIS_DB_USERNAME").ok(),
            password: env::var("ANALYSIS_DB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Analysis configuration, one record per analysis id
        "DEFINE TABLE IF NOT EXISTS analysis SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS config ON TABLE analysis TYPE object;",

        // Conversation history, keyed by project
        "DEFINE TABLE IF NOT EXISTS chat SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS project ON TABLE chat TYPE string;
         DEFINE FIELD IF NOT EXISTS messages ON TABLE chat TYPE array DEFAULT [];
         DEFINE INDEX IF NOT EXISTS chat_project ON TABLE chat COLUMNS project;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_connection_and_schema_twice() {
        let db = create_connection(DatabaseConfig {
            url: "memory".to_string(),
            username: None,
            password: None,
            ..Default::default()
        })
        .await
        .unwrap();

        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();
    }
}
