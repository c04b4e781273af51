use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::state::AppState;

/// Presigned avatar URLs stay valid for half an hour.
const PRESIGN_TTL_SECS: u64 = 30 * 60;

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Store profile picture bytes and return the object key. Bytes are stored
/// as received; no resizing happens server-side.
pub async fn store_avatar(
    st: &AppState,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(content_type).context("unsupported image content type")?;
    let key = format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

pub async fn presign_avatar(st: &AppState, avatar_key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(avatar_key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for key {}", avatar_key))
}

#[cfg(test)]
mod image_tests {
    use crate::state::AppState;
    use bytes::Bytes;
    use uuid::Uuid;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(super::ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/png"), Some("png"));
        assert_eq!(super::ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(super::ext_from_mime("image/heic"), None);
        assert_eq!(super::ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn test_store_and_presign_avatar() {
        let state = AppState::fake();
        let user_id = Uuid::new_v4();

        let key = super::store_avatar(&state, user_id, Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        assert!(key.starts_with(&format!("avatars/{}/", user_id)));
        assert!(key.ends_with(".png"));

        let url = super::presign_avatar(&state, &key).await.unwrap();
        assert!(url.contains(&key));
    }

    #[tokio::test]
    async fn test_store_avatar_rejects_unknown_type() {
        let state = AppState::fake();
        let err = super::store_avatar(
            &state,
            Uuid::new_v4(),
            Bytes::from_static(b"zip"),
            "application/zip",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unsupported image content type"));
    }
}
