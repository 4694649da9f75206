use crate::Database;
use crate::models::{ChatMessageRow, MovieRow, NewWatchlist, UserRow, WatchlistPatch, WatchlistRow};
use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use movienight_types::models::{ChatMessage, MovieEntry, UserSummary, Visibility, Watchlist};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;
use uuid::Uuid;

/// Upper bound on invite-code collisions tolerated before giving up.
const MAX_INVITE_ATTEMPTS: usize = 8;

const WATCHLIST_COLUMNS: &str = "w.id, w.title, w.description, w.visibility, w.owner_id, u.username, u.avatar_url,
     w.invite_code, w.party_time, w.created_at, w.updated_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, username, email, password_hash, avatar_url, now()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Watchlists --

    pub fn create_watchlist(&self, new: &NewWatchlist) -> Result<Watchlist> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = new.id.to_string();
            let owner_id = new.owner_id.to_string();
            let ts = now();

            tx.execute(
                "INSERT INTO watchlists (id, title, description, visibility, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![id, new.title, new.description, new.visibility.as_str(), owner_id, ts],
            )?;
            tx.execute(
                "INSERT INTO watchlist_members (watchlist_id, user_id) VALUES (?1, ?2)",
                params![id, owner_id],
            )?;

            let watchlist = load_watchlist(&tx, &id)?
                .ok_or_else(|| anyhow!("Watchlist {} vanished after insert", id))?;
            tx.commit()?;
            Ok(watchlist)
        })
    }

    pub fn get_watchlist(&self, id: Uuid) -> Result<Option<Watchlist>> {
        self.with_conn(|conn| load_watchlist(conn, &id.to_string()))
    }

    /// Public watchlists plus, for a signed-in viewer, those they own or belong to.
    /// Most recently updated first.
    pub fn list_visible_watchlists(&self, viewer: Option<Uuid>) -> Result<Vec<Watchlist>> {
        self.with_conn(|conn| {
            let viewer = viewer.map(|v| v.to_string());
            let mut stmt = conn.prepare(
                "SELECT w.id FROM watchlists w
                 WHERE w.visibility = 'public'
                    OR (?1 IS NOT NULL AND w.owner_id = ?1)
                    OR (?1 IS NOT NULL AND EXISTS (
                        SELECT 1 FROM watchlist_members m
                        WHERE m.watchlist_id = w.id AND m.user_id = ?1))
                 ORDER BY w.updated_at DESC, w.rowid DESC",
            )?;
            let ids = stmt
                .query_map([viewer], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut lists = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(wl) = load_watchlist(conn, &id)? {
                    lists.push(wl);
                }
            }
            Ok(lists)
        })
    }

    /// Applies the present fields of `patch`. Returns `None` if the watchlist is gone.
    pub fn update_watchlist(&self, id: Uuid, patch: &WatchlistPatch) -> Result<Option<Watchlist>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = id.to_string();

            if let Some(title) = &patch.title {
                tx.execute("UPDATE watchlists SET title = ?1 WHERE id = ?2", params![title, id])?;
            }
            if let Some(description) = &patch.description {
                tx.execute(
                    "UPDATE watchlists SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }
            if let Some(visibility) = patch.visibility {
                tx.execute(
                    "UPDATE watchlists SET visibility = ?1 WHERE id = ?2",
                    params![visibility.as_str(), id],
                )?;
            }
            if let Some(party_time) = patch.party_time {
                tx.execute(
                    "UPDATE watchlists SET party_time = ?1 WHERE id = ?2",
                    params![party_time.map(format_ts), id],
                )?;
            }

            let touched = tx.execute(
                "UPDATE watchlists SET updated_at = ?1 WHERE id = ?2",
                params![now(), id],
            )?;
            if touched == 0 {
                return Ok(None);
            }

            let watchlist = load_watchlist(&tx, &id)?;
            tx.commit()?;
            Ok(watchlist)
        })
    }

    /// Deletes the watchlist together with its members, movies and chat history.
    pub fn delete_watchlist(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM watchlists WHERE id = ?1", [id.to_string()])?;
            Ok(deleted > 0)
        })
    }

    /// Appends a movie. Returns `false` when the watchlist already holds that `tmdb_id`.
    pub fn add_movie(&self, watchlist_id: Uuid, movie: &MovieEntry) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = watchlist_id.to_string();

            let inserted = tx.execute(
                "INSERT INTO watchlist_movies
                    (watchlist_id, tmdb_id, title, poster_path, release_date, overview, trailer_key, added_by, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    movie.tmdb_id,
                    movie.title,
                    movie.poster_path,
                    movie.release_date,
                    movie.overview,
                    movie.trailer_key,
                    movie.added_by.to_string(),
                    format_ts(movie.added_at),
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(false),
                Err(e) => return Err(e.into()),
            }

            tx.execute(
                "UPDATE watchlists SET updated_at = ?1 WHERE id = ?2",
                params![now(), id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Removes a movie by its external id. Returns whether anything was removed.
    pub fn remove_movie(&self, watchlist_id: Uuid, tmdb_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = watchlist_id.to_string();

            let removed = tx.execute(
                "DELETE FROM watchlist_movies WHERE watchlist_id = ?1 AND tmdb_id = ?2",
                params![id, tmdb_id],
            )?;
            if removed > 0 {
                tx.execute(
                    "UPDATE watchlists SET updated_at = ?1 WHERE id = ?2",
                    params![now(), id],
                )?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    /// Returns the watchlist's invite code, generating and storing one on first use.
    /// `generate` is called again whenever a candidate collides with another list's code.
    /// Returns `None` if the watchlist does not exist.
    pub fn ensure_invite_code<G>(&self, watchlist_id: Uuid, mut generate: G) -> Result<Option<String>>
    where
        G: FnMut() -> String,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = watchlist_id.to_string();

            let existing: Option<Option<String>> = tx
                .query_row("SELECT invite_code FROM watchlists WHERE id = ?1", [&id], |row| {
                    row.get(0)
                })
                .optional()?;

            let code = match existing {
                None => return Ok(None),
                Some(Some(code)) => code,
                Some(None) => {
                    let mut attempts = 0;
                    loop {
                        let candidate = generate();
                        let result = tx.execute(
                            "UPDATE watchlists SET invite_code = ?1, updated_at = ?2 WHERE id = ?3",
                            params![candidate, now(), id],
                        );
                        match result {
                            Ok(_) => break candidate,
                            Err(e) if is_unique_violation(&e) && attempts < MAX_INVITE_ATTEMPTS => {
                                attempts += 1;
                                warn!("Invite code collision on watchlist {} (attempt {})", id, attempts);
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            };

            tx.commit()?;
            Ok(Some(code))
        })
    }

    pub fn find_watchlist_by_invite(&self, code: &str) -> Result<Option<Watchlist>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row("SELECT id FROM watchlists WHERE invite_code = ?1", [code], |row| {
                    row.get(0)
                })
                .optional()?;

            match id {
                Some(id) => load_watchlist(conn, &id),
                None => Ok(None),
            }
        })
    }

    /// Adds a member. Returns `false` when they already belonged to the list.
    pub fn add_member(&self, watchlist_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = watchlist_id.to_string();

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO watchlist_members (watchlist_id, user_id) VALUES (?1, ?2)",
                params![id, user_id.to_string()],
            )?;
            if inserted > 0 {
                tx.execute(
                    "UPDATE watchlists SET updated_at = ?1 WHERE id = ?2",
                    params![now(), id],
                )?;
            }
            tx.commit()?;
            Ok(inserted > 0)
        })
    }

    // -- Chat --

    pub fn insert_chat_message(&self, msg: &ChatMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (id, watchlist_id, user_id, username, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.id.to_string(),
                    msg.watchlist_id.to_string(),
                    msg.user_id.map(|u| u.to_string()),
                    msg.username,
                    msg.text,
                    format_ts(msg.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// The `limit` most recent messages of a watchlist, oldest first.
    pub fn recent_chat_messages(&self, watchlist_id: Uuid, limit: u32) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, watchlist_id, user_id, username, text, created_at
                 FROM chat_messages
                 WHERE watchlist_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![watchlist_id.to_string(), limit], |row| {
                    Ok(ChatMessageRow {
                        id: row.get(0)?,
                        watchlist_id: row.get(1)?,
                        user_id: row.get(2)?,
                        username: row.get(3)?,
                        text: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().rev().map(chat_message_from_row).collect()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, avatar_url, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                avatar_url: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn load_watchlist(conn: &Connection, id: &str) -> Result<Option<Watchlist>> {
    // JOIN users so the owner summary comes back in the same query
    let sql = format!(
        "SELECT {} FROM watchlists w LEFT JOIN users u ON w.owner_id = u.id WHERE w.id = ?1",
        WATCHLIST_COLUMNS
    );
    let row = conn
        .query_row(&sql, [id], |row| {
            Ok(WatchlistRow {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                visibility: row.get(3)?,
                owner_id: row.get(4)?,
                owner_username: row.get(5)?,
                owner_avatar_url: row.get(6)?,
                invite_code: row.get(7)?,
                party_time: row.get(8)?,
                created_at: row.get(9)?,
                updated_at: row.get(10)?,
            })
        })
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id FROM watchlist_members WHERE watchlist_id = ?1 ORDER BY rowid",
    )?;
    let members = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .iter()
        .map(|m| parse_uuid(m))
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT tmdb_id, title, poster_path, release_date, overview, trailer_key, added_by, added_at
         FROM watchlist_movies WHERE watchlist_id = ?1 ORDER BY rowid",
    )?;
    let movies = stmt
        .query_map([id], |row| {
            Ok(MovieRow {
                tmdb_id: row.get(0)?,
                title: row.get(1)?,
                poster_path: row.get(2)?,
                release_date: row.get(3)?,
                overview: row.get(4)?,
                trailer_key: row.get(5)?,
                added_by: row.get(6)?,
                added_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(movie_from_row)
        .collect::<Result<Vec<_>>>()?;

    let visibility = Visibility::parse(&row.visibility)
        .ok_or_else(|| anyhow!("Corrupt visibility '{}' on watchlist {}", row.visibility, row.id))?;

    Ok(Some(Watchlist {
        id: parse_uuid(&row.id)?,
        title: row.title,
        description: row.description,
        visibility,
        owner: UserSummary {
            id: parse_uuid(&row.owner_id)?,
            username: row.owner_username.unwrap_or_else(|| "unknown".to_string()),
            avatar_url: row.owner_avatar_url,
        },
        members,
        movies,
        invite_code: row.invite_code,
        party_time: row.party_time.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&row.created_at)?,
        updated_at: parse_ts(&row.updated_at)?,
    }))
}

fn movie_from_row(row: MovieRow) -> Result<MovieEntry> {
    Ok(MovieEntry {
        tmdb_id: row.tmdb_id,
        title: row.title,
        poster_path: row.poster_path,
        release_date: row.release_date,
        overview: row.overview,
        trailer_key: row.trailer_key,
        added_by: parse_uuid(&row.added_by)?,
        added_at: parse_ts(&row.added_at)?,
    })
}

fn chat_message_from_row(row: ChatMessageRow) -> Result<ChatMessage> {
    Ok(ChatMessage {
        id: parse_uuid(&row.id)?,
        watchlist_id: parse_uuid(&row.watchlist_id)?,
        user_id: row.user_id.as_deref().map(parse_uuid).transpose()?,
        username: row.username,
        text: row.text,
        created_at: parse_ts(&row.created_at)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
            && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse().map_err(|e| anyhow!("Corrupt id '{}': {}", s, e))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow!("Corrupt timestamp '{}': {}", s, e))?
        .with_timezone(&Utc))
}

fn now() -> String {
    format_ts(Utc::now())
}
