use std::time::Duration;

use data_encoding::{Encoding, Specification};
use uuid::Uuid;

use crate::driver::{Driver, ListFilter, LockOutcome};
use crate::error::{StoreError, StoreResult};

const DIRECTORY_LEASE_KEY: &str = "100";
const DIRECTORY_LEASE_TTL_MS: u64 = 10_000;
const SUFFIX: &str = "w32";

fn base32() -> Encoding {
    let mut spec = Specification::new();
    spec.symbols.push_str("ABCDEFGHIJKLMNOPQRSTUVWXYZ234567");
    spec.padding = Some('*');
    spec.encoding().expect("base32 spec is valid")
}

fn is_simple(s: &str) -> bool {
    let mut chars = s.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase());
    starts_ok
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !s.ends_with(SUFFIX)
}

/// Map an arbitrary name to a basic-Latin-only, lowercase identifier: pass
/// already-simple names through, otherwise Base32-encode and tag with a
/// `w32` suffix so the two forms are unambiguous.
pub fn sanitise(s: &str) -> String {
    if is_simple(s) {
        return s.to_ascii_lowercase();
    }
    let encoded = base32().encode(s.as_bytes());
    let stripped = encoded.trim_end_matches('*');
    format!("{stripped}{SUFFIX}").to_ascii_lowercase()
}

/// Inverse of [`sanitise`]: strip the `w32` suffix, uppercase, Base32-decode.
/// Returns `None` when `s` was not produced by the encoded branch of
/// `sanitise` (i.e. it was already a simple name and there is nothing to
/// decode back).
fn desanitise(s: &str) -> StoreResult<Option<String>> {
    let Some(body) = s.strip_suffix(SUFFIX) else {
        return Ok(None);
    };
    let upper = body.to_ascii_uppercase();
    let padded = pad_to_octet(&upper);
    let bytes = base32()
        .decode(padded.as_bytes())
        .map_err(|e| StoreError::serialization(format!("invalid base32 index name: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| StoreError::serialization(format!("decoded name is not utf-8: {e}")))?;
    Ok(Some(text))
}

fn pad_to_octet(s: &str) -> String {
    let rem = s.len() % 8;
    if rem == 0 {
        return s.to_string();
    }
    let mut out = s.to_string();
    out.push_str(&"*".repeat(8 - rem));
    out
}

fn is_uuid_simple(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Compute the internal index name for `(app_code, category_name)`, minting
/// and persisting a directory UUID when the sanitised candidate would
/// exceed the driver's index-name length limit.
pub async fn translate(
    driver: &dyn Driver,
    app_code: &str,
    category_name: &str,
) -> StoreResult<String> {
    let limits = driver.limits();
    let a = sanitise(app_code);
    let candidate = format!("{a}_{}", sanitise(category_name));
    if candidate.len() <= limits.max_index_name_len {
        return Ok(candidate);
    }

    let directory_index = format!("{a}__indices");
    acquire_directory_lease(driver, &directory_index).await?;

    let uuid = match find_existing_uuid(driver, &directory_index, category_name).await {
        Ok(Some(uuid)) => uuid,
        Ok(None) => {
            let fresh = Uuid::new_v4().simple().to_string();
            let write_result = driver
                .put_primary(&directory_index, &fresh, category_name.as_bytes().to_vec())
                .await;
            if let Err(err) = write_result {
                let _ = driver.unlock(&directory_index, DIRECTORY_LEASE_KEY).await;
                return Err(err);
            }
            fresh
        }
        Err(err) => {
            let _ = driver.unlock(&directory_index, DIRECTORY_LEASE_KEY).await;
            return Err(err);
        }
    };

    driver.unlock(&directory_index, DIRECTORY_LEASE_KEY).await?;
    Ok(format!("{a}_{uuid}"))
}

/// Inverse of [`translate`]: recover the original category name from an
/// internal index name.
pub async fn inverse(
    driver: &dyn Driver,
    app_code: &str,
    internal_index: &str,
) -> StoreResult<String> {
    let a = sanitise(app_code);
    let prefix = format!("{a}_");
    let remainder = internal_index
        .strip_prefix(&prefix)
        .ok_or_else(|| StoreError::configuration("internal index name does not match app code"))?;

    if is_uuid_simple(remainder) {
        let directory_index = format!("{a}__indices");
        let bytes = driver
            .get(&directory_index, remainder)
            .await?
            .ok_or_else(|| StoreError::configuration("unknown directory uuid"))?;
        return String::from_utf8(bytes)
            .map_err(|e| StoreError::serialization(format!("directory entry is not utf-8: {e}")));
    }

    match desanitise(remainder)? {
        Some(name) => Ok(name),
        None => Ok(remainder.to_string()),
    }
}

async fn acquire_directory_lease(driver: &dyn Driver, directory_index: &str) -> StoreResult<()> {
    loop {
        match driver
            .try_lock(directory_index, DIRECTORY_LEASE_KEY, DIRECTORY_LEASE_TTL_MS)
            .await?
        {
            LockOutcome::Acquired => return Ok(()),
            LockOutcome::HeldElsewhere { wait_hint_ms } => {
                log::debug!(
                    "directory lease for {directory_index} held elsewhere, retrying in {wait_hint_ms}ms"
                );
                tokio::time::sleep(Duration::from_millis(wait_hint_ms.max(1))).await;
            }
        }
    }
}

async fn find_existing_uuid(
    driver: &dyn Driver,
    directory_index: &str,
    category_name: &str,
) -> StoreResult<Option<String>> {
    let keys = driver.list(directory_index, &ListFilter::default()).await?;
    for key in keys {
        if let Some(bytes) = driver.get(directory_index, &key).await? {
            if bytes == category_name.as_bytes() {
                return Ok(Some(key));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_preserves_already_simple_names() {
        assert_eq!(sanitise("articles"), "articles");
        assert_eq!(sanitise("my_app_2"), "my_app_2");
    }

    #[test]
    fn sanitise_encodes_input_with_uppercase_letters() {
        // is_simple only accepts already-lowercase names; anything else,
        // including a name that's otherwise "simple" but uppercase, takes
        // the Base32 branch rather than being lowercased in place.
        let encoded = sanitise("ARTICLES");
        assert!(encoded.ends_with("w32"));
    }

    #[test]
    fn sanitise_encodes_non_simple_names() {
        let encoded = sanitise("My App!");
        assert!(encoded.ends_with("w32"));
        assert!(encoded.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn sanitise_encodes_names_that_would_collide_with_suffix() {
        // ends in "w32" but is otherwise simple: must still be encoded so the
        // suffix unambiguously marks an encoded name.
        let encoded = sanitise("foow32");
        assert!(encoded.ends_with("w32"));
        assert_ne!(encoded, "foow32");
    }

    #[test]
    fn sanitise_round_trips_through_desanitise() {
        let original = "Статьи";
        let encoded = sanitise(original);
        let decoded = desanitise(&encoded).unwrap();
        assert_eq!(decoded.as_deref(), Some(original));
    }

    #[test]
    fn desanitise_returns_none_for_simple_names() {
        assert_eq!(desanitise("articles").unwrap(), None);
    }
}
