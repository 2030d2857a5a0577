use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorMessage, HttpError};
use crate::models::usermodel::UserType;

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub user_type: UserType,
    #[serde(default)]
    pub admin_roles: Vec<String>,
    pub iat: usize,
    pub exp: usize,
}

pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<TokenClaims, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) => Ok(token.claims),
        Err(_) => Err(HttpError::unauthorized(ErrorMessage::InvalidToken.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_token(
        user_id: &str,
        user_type: UserType,
        admin_roles: Vec<String>,
        secret: &[u8],
        expires_in_seconds: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        if user_id.is_empty() {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
        }

        let now = Utc::now();
        let iat = now.timestamp() as usize;
        let exp = (now + Duration::seconds(expires_in_seconds)).timestamp() as usize;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            user_type,
            admin_roles,
            iat,
            exp,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
    }

    #[test]
    fn round_trips_claims() {
        let secret = b"test-secret";
        let token = create_token("8f6c", UserType::Admin, vec!["finance".into()], secret, 60).unwrap();
        let claims = decode_token(token, secret).unwrap();
        assert_eq!(claims.sub, "8f6c");
        assert_eq!(claims.user_type, UserType::Admin);
        assert_eq!(claims.admin_roles, vec!["finance".to_string()]);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let token = create_token("8f6c", UserType::Normal, vec![], b"one", 60).unwrap();
        assert!(decode_token(token, b"two").is_err());

        let expired = create_token("8f6c", UserType::Normal, vec![], b"one", -3600).unwrap();
        assert!(decode_token(expired, b"one").is_err());
    }

    #[test]
    fn empty_subject_is_refused() {
        assert!(create_token("", UserType::Normal, vec![], b"one", 60).is_err());
    }
}
