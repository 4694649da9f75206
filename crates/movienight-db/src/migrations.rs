use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar_url  TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS watchlists (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            description TEXT,
            visibility  TEXT NOT NULL DEFAULT 'private'
                        CHECK (visibility IN ('public', 'private')),
            owner_id    TEXT NOT NULL REFERENCES users(id),
            invite_code TEXT UNIQUE,
            party_time  TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_watchlists_owner
            ON watchlists(owner_id, visibility);

        CREATE TABLE IF NOT EXISTS watchlist_members (
            watchlist_id TEXT NOT NULL REFERENCES watchlists(id) ON DELETE CASCADE,
            user_id      TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (watchlist_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON watchlist_members(user_id);

        CREATE TABLE IF NOT EXISTS watchlist_movies (
            watchlist_id TEXT NOT NULL REFERENCES watchlists(id) ON DELETE CASCADE,
            tmdb_id      INTEGER NOT NULL,
            title        TEXT,
            poster_path  TEXT,
            release_date TEXT,
            overview     TEXT,
            trailer_key  TEXT,
            added_by     TEXT NOT NULL,
            added_at     TEXT NOT NULL,
            UNIQUE (watchlist_id, tmdb_id)
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id           TEXT PRIMARY KEY,
            watchlist_id TEXT NOT NULL REFERENCES watchlists(id) ON DELETE CASCADE,
            user_id      TEXT,
            username     TEXT NOT NULL,
            text         TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_watchlist
            ON chat_messages(watchlist_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
