//! Unit tests for access token entities

use serde_json::Map;

use crate::domain::entities::{AccessTokenClaims, AccessTokenFields, AccessTokenVersion};

fn fields() -> AccessTokenFields {
    AccessTokenFields {
        session_handle: "handle".to_string(),
        user_id: "user".to_string(),
        recipe_user_id: None,
        refresh_token_hash1: "hash1".to_string(),
        parent_refresh_token_hash1: None,
        anti_csrf_token: None,
        user_payload: Map::new(),
        last_manual_refresh_time: Some(10),
        time_created: 10,
        expiry_time: 20,
    }
}

#[test]
fn test_version_parsing() {
    assert_eq!("1".parse::<AccessTokenVersion>().unwrap(), AccessTokenVersion::V1);
    assert_eq!("v2".parse::<AccessTokenVersion>().unwrap(), AccessTokenVersion::V2);
    assert_eq!("V3".parse::<AccessTokenVersion>().unwrap(), AccessTokenVersion::V3);
    assert!("4".parse::<AccessTokenVersion>().is_err());
    assert_eq!(AccessTokenVersion::default(), AccessTokenVersion::V3);
}

#[test]
fn test_claims_tag() {
    let v1 = AccessTokenClaims::new(AccessTokenVersion::V1, "ignored".to_string(), fields());
    assert_eq!(v1.version(), AccessTokenVersion::V1);
    assert_eq!(v1.kid(), None);

    let v3 = AccessTokenClaims::new(AccessTokenVersion::V3, "d-1".to_string(), fields());
    assert_eq!(v3.version(), AccessTokenVersion::V3);
    assert_eq!(v3.kid(), Some("d-1"));
    assert_eq!(v3.fields().session_handle, "handle");
}

#[test]
fn test_effective_recipe_user_id() {
    let mut f = fields();
    assert_eq!(f.effective_recipe_user_id(), "user");
    f.recipe_user_id = Some("recipe".to_string());
    assert_eq!(f.effective_recipe_user_id(), "recipe");
}

#[test]
fn test_expiry_boundary() {
    let f = fields();
    assert!(!f.is_expired(19));
    assert!(f.is_expired(20));
}
