// Store access for the run pipeline.
//
// Reads resolve an analysis and its conversation; the only write is the
// message list of an existing conversation.

use crate::db::connection::Db;
use crate::db::schema::*;
use crate::error::{RunError, RunResult};
use crate::types::{AnalysisId, ProjectId};

pub struct QueryBuilder;

impl QueryBuilder {
    /// Fetch an analysis by primary key.
    pub async fn find_analysis(
        db: &Db,
        analysis_id: AnalysisId,
    ) -> RunResult<Option<AnalysisRecord>> {
        let mut res = db
            .query("SELECT * FROM $id")
            .bind(("id", AnalysisRecord::record_id(analysis_id)))
            .await?;

        let analysis: Option<AnalysisRecord> = res.take(0)?;
        Ok(analysis)
    }

    /// Find the conversation attached to a project, if any.
    pub async fn find_chat_by_project(
        db: &Db,
        project: &ProjectId,
    ) -> RunResult<Option<ChatRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM chat
                WHERE project = $project
                LIMIT 1
                "#,
            )
            .bind(("project", project.as_str().to_string()))
            .await?;

        let chats: Vec<ChatRecord> = res.take(0)?;
        Ok(chats.into_iter().next())
    }

    /// Persist the message list of a conversation by primary key.
    pub async fn save_chat_messages(db: &Db, chat: &ChatRecord) -> RunResult<ChatRecord> {
        let mut res = db
            .query(
                r#"
                UPDATE $id SET
                    messages = $messages,
                    updated_at = time::now()
                "#,
            )
            .bind(("id", chat.id.clone()))
            .bind(("messages", chat.messages.clone()))
            .await?;

        let updated: Option<ChatRecord> = res.take(0)?;
        updated.ok_or_else(|| RunError::Database(format!("chat {} no longer exists", chat.id)))
    }

    /// Create an analysis record under a known id.
    pub async fn create_analysis(
        db: &Db,
        analysis_id: AnalysisId,
        data: &AnalysisCreate,
    ) -> RunResult<AnalysisRecord> {
        let mut res = db
            .query("CREATE $id CONTENT $content")
            .bind(("id", AnalysisRecord::record_id(analysis_id)))
            .bind(("content", data.clone()))
            .await?;

        let created: Option<AnalysisRecord> = res.take(0)?;
        created.ok_or_else(|| RunError::Database("failed to create analysis record".to_string()))
    }

    /// Create a conversation for a project.
    pub async fn create_chat(db: &Db, data: &ChatCreate) -> RunResult<ChatRecord> {
        let mut res = db
            .query("CREATE chat CONTENT $content")
            .bind(("content", data.clone()))
            .await?;

        let created: Option<ChatRecord> = res.take(0)?;
        created.ok_or_else(|| RunError::Database("failed to create chat record".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_connection, ensure_schema, DatabaseConfig};
    use serde_json::json;

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            username: None,
            password: None,
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_analysis_roundtrip() {
        let db = setup_test_db().await;
        let id = AnalysisId::random();
        let config = json!({"python": {"project": "proj-1"}});

        QueryBuilder::create_analysis(
            &db,
            id,
            &AnalysisCreate {
                config: config.as_object().unwrap().clone(),
            },
        )
        .await
        .unwrap();

        let found = QueryBuilder::find_analysis(&db, id).await.unwrap().unwrap();
        assert_eq!(found.id, AnalysisRecord::record_id(id));
        assert_eq!(found.project_id().unwrap(), ProjectId::new("proj-1"));
    }

    #[tokio::test]
    async fn test_unknown_analysis_is_none() {
        let db = setup_test_db().await;
        let found = QueryBuilder::find_analysis(&db, AnalysisId::random()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_chat_lookup_and_save() {
        let db = setup_test_db().await;
        let project = ProjectId::new("proj-7");

        assert!(QueryBuilder::find_chat_by_project(&db, &project).await.unwrap().is_none());

        let created = QueryBuilder::create_chat(
            &db,
            &ChatCreate {
                project: project.clone(),
                messages: vec![Message::with_request("cluster the cells")],
            },
        )
        .await
        .unwrap();

        let mut chat = QueryBuilder::find_chat_by_project(&db, &project)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.id, created.id);
        assert_eq!(chat.messages[0].request, "cluster the cells");
        assert_eq!(chat.messages[0].status, "pending");

        chat.messages[0].text = "done\n".to_string();
        QueryBuilder::save_chat_messages(&db, &chat).await.unwrap();

        let reloaded = QueryBuilder::find_chat_by_project(&db, &project)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.messages[0].text, "done\n");
        assert_eq!(reloaded.messages[0].request, "cluster the cells");
    }
}
