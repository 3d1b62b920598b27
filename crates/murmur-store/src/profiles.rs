use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use murmur_shared::keys::PublicKey;
use murmur_shared::storage::ProfileDirectory;
use murmur_shared::types::{normalize_username, Profile, PublishedKey, UserId};

use crate::database::{conversion_error, decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

const PROFILE_COLUMNS: &str =
    "user_id, username, display_name, photo_url, public_key, key_format, updated_at";

impl Database {
    /// Create or update the display fields of a profile. A previously
    /// published key is left untouched. The username is stored normalized.
    pub fn upsert_profile(
        &self,
        user: &UserId,
        username: Option<&str>,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<()> {
        let username = username.map(normalize_username).filter(|u| !u.is_empty());
        self.conn().execute(
            "INSERT INTO profiles (user_id, username, display_name, photo_url, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 username     = excluded.username,
                 display_name = excluded.display_name,
                 photo_url    = excluded.photo_url,
                 updated_at   = excluded.updated_at",
            params![
                user.as_str(),
                username,
                display_name,
                photo_url,
                encode_ts(&Utc::now())
            ],
        )?;
        Ok(())
    }

    /// Publish (or rotate) the public key of `user`.
    pub fn publish_public_key(&self, user: &UserId, key: &PublicKey) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (user_id, public_key, key_format, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 public_key = excluded.public_key,
                 key_format = excluded.key_format,
                 updated_at = excluded.updated_at",
            params![
                user.as_str(),
                hex::encode(key.as_bytes()),
                key.format(),
                encode_ts(&Utc::now()),
            ],
        )?;
        tracing::info!(user = %user, "published public key");
        Ok(())
    }

    pub fn get_profile(&self, user: &UserId) -> Result<Option<Profile>> {
        let profile = self
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                params![user.as_str()],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// First profile (by user id) whose username matches `username` after
    /// normalization, skipping `exclude`.
    pub fn find_profile_by_username(
        &self,
        username: &str,
        exclude: &UserId,
    ) -> Result<Option<Profile>> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Ok(None);
        }

        let profile = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE username = ?1 AND user_id != ?2
                     ORDER BY user_id ASC
                     LIMIT 1"
                ),
                params![username, exclude.as_str()],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// The decoded public key of `user`, if one was published.
    pub fn get_public_key(&self, user: &UserId) -> Result<Option<PublicKey>> {
        let hex_key: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT public_key FROM profiles WHERE user_id = ?1",
                params![user.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match hex_key.flatten() {
            Some(encoded) => Ok(Some(decode_key(0, &encoded)?)),
            None => Ok(None),
        }
    }
}

fn decode_key(idx: usize, encoded: &str) -> rusqlite::Result<PublicKey> {
    let bytes = hex::decode(encoded).map_err(|e| conversion_error(idx, e))?;
    PublicKey::from_bytes(&bytes).map_err(|e| conversion_error(idx, e))
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let user_str: String = row.get(0)?;
    let username: Option<String> = row.get(1)?;
    let display_name: Option<String> = row.get(2)?;
    let photo_url: Option<String> = row.get(3)?;
    let key_hex: Option<String> = row.get(4)?;
    let key_format: Option<String> = row.get(5)?;
    let ts_str: String = row.get(6)?;

    let user_id = UserId::new(user_str).map_err(|e| conversion_error(0, e))?;
    let published_key = match key_hex {
        Some(encoded) => {
            let key = decode_key(4, &encoded)?;
            Some(PublishedKey {
                public_key: key.to_base64(),
                format: key_format.unwrap_or_else(|| key.format().to_string()),
            })
        }
        None => None,
    };
    let updated_at = decode_ts(6, &ts_str)?;

    Ok(Profile {
        user_id,
        username,
        display_name,
        photo_url,
        published_key,
        updated_at,
    })
}

impl ProfileDirectory for Database {
    type Error = StoreError;

    fn profile(&self, user: &UserId) -> Result<Option<Profile>> {
        self.get_profile(user)
    }
}
