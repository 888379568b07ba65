use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::id::Id;
use crate::store::Store;

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific user with specific rights.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken<U> {
    pub id: Id,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Create a new [`AuthToken`] for the given user, with the correct rights for that user type.
    pub fn new(user: &U) -> Self {
        Self {
            id: user.id().clone(),
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish())
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and verify that it has the correct
    /// rights for this user type, and that the user still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(req.guard::<&State<Config>>().await.map_failure(|_| {
            (
                Status::InternalServerError,
                Error::Status(Status::InternalServerError, "Config not managed".into()),
            )
        }));
        let store = try_outcome!(req.guard::<Store>().await.map_failure(|_| {
            (
                Status::InternalServerError,
                Error::Status(Status::InternalServerError, "Store not managed".into()),
            )
        }));

        // Forward to any routes that do not require an authentication token.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));

        // Decode the token.
        let token: Self = try_outcome!(Self::from_cookie(cookie, config).or_forward(()));

        // Check it represents the correct rights.
        if !token.permits(U::RIGHTS) {
            return Outcome::Forward(());
        }

        // Check the user actually exists.
        match store.get(&U::path(&token.id)).await {
            Ok(Some(_)) => Outcome::Success(token),
            Ok(None) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::admin::{Admin, AdminCore};
    use crate::model::voter::Voter;

    use super::*;

    fn config() -> Config {
        Config::example()
    }

    #[test]
    fn cookie_round_trip() {
        let admin = Admin {
            id: "a1".parse().unwrap(),
            admin: AdminCore {
                username: "root".into(),
                password_hash: String::new(),
            },
        };
        let cookie = AuthToken::new(&admin).into_cookie(&config()).unwrap();
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);

        let token = AuthToken::<Admin>::from_cookie(&cookie, &config()).unwrap();
        assert_eq!(token.id.as_str(), "a1");
        assert!(token.permits(Rights::Admin));

        // The same JWT decodes as a voter token, but with admin rights, so
        // the request guard refuses it.
        let as_voter = AuthToken::<Voter>::from_cookie(&cookie, &config()).unwrap();
        assert!(!as_voter.permits(Rights::Voter));
    }

    #[test]
    fn wrong_secret_rejected() {
        let admin = Admin {
            id: "a1".parse().unwrap(),
            admin: AdminCore {
                username: "root".into(),
                password_hash: String::new(),
            },
        };
        let cookie = AuthToken::new(&admin).into_cookie(&config()).unwrap();
        let other = Config::example_with_secret("a different secret");
        assert!(AuthToken::<Admin>::from_cookie(&cookie, &other).is_err());
    }
}
