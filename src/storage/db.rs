use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};

/// Connect to SQLite and apply the schema. The returned handle is the only
/// reference to the pool; callers inject it into the repository explicitly.
pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", database_url);

    // Handle special SQLite URL formats
    let db = if database_url == "sqlite::memory:" {
        Database::connect(database_url).await?
    } else if let Some(path_str) = database_url.strip_prefix("sqlite://") {
        let path_str = path_str.split('?').next().unwrap_or(path_str);
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbErr::Custom(format!("Failed to create DB directory: {e}")))?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        if !path.exists() {
            std::fs::File::create(path)
                .map_err(|e| DbErr::Custom(format!("Failed to create DB file: {e}")))?;
            tracing::info!("Created database file: {}", path.display());
        }

        Database::connect(database_url).await?
    } else {
        return Err(DbErr::Custom("Invalid SQLite URL format".to_string()));
    };

    apply_migrations(&db).await?;

    Ok(db)
}

/// All statements are idempotent (IF NOT EXISTS), so this runs on every start.
async fn apply_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    tracing::info!("Applying migrations...");

    let migrations = [
        include_str!("../../migrations/001_create_conversations.sql"),
        include_str!("../../migrations/002_create_messages.sql"),
        include_str!("../../migrations/003_create_faqs.sql"),
        include_str!("../../migrations/004_add_updated_at_triggers.sql"),
    ];

    for (i, sql) in migrations.iter().enumerate() {
        db.execute_unprepared(sql).await?;
        tracing::debug!("Applied migration {}", i + 1);
    }

    // The FTS index is created outside the migration files: SQLite virtual
    // tables interact badly with batched migration statements.
    db.execute_unprepared(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS faqs_fts USING fts5(
            faq_id UNINDEXED,
            question,
            answer,
            tokenize='porter'
        );
        "#,
    )
    .await?;

    // Triggers keep faqs_fts in sync with the faqs table.
    db.execute_unprepared(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_faqs_fts_insert AFTER INSERT ON faqs BEGIN
            INSERT INTO faqs_fts(faq_id, question, answer)
            VALUES (new.id, new.question, new.answer);
        END;
        "#,
    )
    .await?;

    db.execute_unprepared(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_faqs_fts_update
        AFTER UPDATE OF question, answer ON faqs BEGIN
            DELETE FROM faqs_fts WHERE faq_id = old.id;
            INSERT INTO faqs_fts(faq_id, question, answer)
            VALUES (new.id, new.question, new.answer);
        END;
        "#,
    )
    .await?;

    db.execute_unprepared(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_faqs_fts_delete AFTER DELETE ON faqs BEGIN
            DELETE FROM faqs_fts WHERE faq_id = old.id;
        END;
        "#,
    )
    .await?;

    Ok(())
}
