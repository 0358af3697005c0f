//! The seeded schema used by the end-to-end extraction scenarios.
//!
//! Five connected tables (organizations <- users/projects, projects <- tasks,
//! tasks/users <- comments) plus a composite-key table, with jsonb columns
//! covering the SQL NULL / JSON null distinction.

use tokio_postgres::Client;

/// Tables managed by [`setup`], children first so plain drops succeed too.
pub const TABLES: [&str; 6] = [
    "comments",
    "memberships",
    "tasks",
    "projects",
    "users",
    "organizations",
];

const SCHEMA: &str = "
    CREATE TABLE organizations (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        settings JSONB
    );

    CREATE TABLE users (
        id BIGINT PRIMARY KEY,
        org_id BIGINT NOT NULL REFERENCES organizations(id),
        manager_id BIGINT REFERENCES users(id),
        email TEXT NOT NULL,
        profile JSONB
    );

    CREATE TABLE projects (
        id BIGINT PRIMARY KEY,
        org_id BIGINT NOT NULL REFERENCES organizations(id),
        name TEXT NOT NULL
    );

    CREATE TABLE tasks (
        id BIGINT PRIMARY KEY,
        project_id BIGINT NOT NULL REFERENCES projects(id),
        assigned_to BIGINT REFERENCES users(id),
        title TEXT NOT NULL,
        attributes JSONB
    );

    CREATE TABLE comments (
        id BIGINT PRIMARY KEY,
        task_id BIGINT NOT NULL REFERENCES tasks(id),
        author_id BIGINT NOT NULL REFERENCES users(id),
        body TEXT NOT NULL
    );

    CREATE TABLE memberships (
        group_id BIGINT NOT NULL,
        user_id BIGINT NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (group_id, user_id)
    );
";

const SEED: &str = "
    INSERT INTO organizations (id, name, settings) VALUES
        (1, 'Acme Corp', '{\"tier\": \"enterprise\"}');

    INSERT INTO users (id, org_id, manager_id, email, profile) VALUES
        (1, 1, NULL, 'morgan@acme.test', NULL),
        (2, 1, 1, 'riley@acme.test', '{\"theme\": \"dark\"}'),
        (3, 1, 1, 'casey@acme.test', 'null');

    INSERT INTO projects (id, org_id, name) VALUES
        (1, 1, 'Apollo'),
        (2, 1, 'Borealis');

    INSERT INTO tasks (id, project_id, assigned_to, title, attributes) VALUES
        (1, 1, 2, 'Design schema', '{}'),
        (2, 1, 3, 'Implement traversal', 'null'),
        (3, 1, 2, 'Write docs', NULL),
        (4, 2, 3, 'Plan rollout', '[1, 2]'),
        (5, 2, NULL, 'Backlog triage', '{\"a\": 1}');

    INSERT INTO comments (id, task_id, author_id, body) VALUES
        (1, 1, 1, 'Looks good'),
        (2, 3, 2, 'Needs examples'),
        (3, 2, 2, 'Half done'),
        (4, 2, 3, 'Review ready');

    INSERT INTO memberships (group_id, user_id, role) VALUES
        (10, 1, 'owner'),
        (10, 2, 'member');
";

/// Drop every dataset table, plus any cycle fixtures a failed test may have
/// left behind.
pub async fn drop_tables(client: &Client) -> anyhow::Result<()> {
    for table in TABLES.iter().chain(["cycle_a", "cycle_b"].iter()) {
        client
            .execute(&format!("DROP TABLE IF EXISTS {table} CASCADE"), &[])
            .await?;
    }
    Ok(())
}

pub async fn create_tables(client: &Client) -> anyhow::Result<()> {
    client.batch_execute(SCHEMA).await?;
    Ok(())
}

pub async fn seed_rows(client: &Client) -> anyhow::Result<()> {
    client.batch_execute(SEED).await?;
    Ok(())
}

/// Reset the database to the pristine seeded dataset.
pub async fn setup(client: &Client) -> anyhow::Result<()> {
    drop_tables(client).await?;
    create_tables(client).await?;
    seed_rows(client).await?;
    Ok(())
}

/// Create the schema only, for targets that receive extracted data.
pub async fn setup_empty(client: &Client) -> anyhow::Result<()> {
    drop_tables(client).await?;
    create_tables(client).await?;
    Ok(())
}
