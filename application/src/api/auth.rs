//! Auth endpoints.

use std::time::Duration;

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use secrecy::SecretBox;
use serde::{Deserialize, Serialize};
use service::{
    command::{
        self,
        issue_one_time_token::Recipient,
        Command as _,
    },
    domain::{
        user::{self, one_time, session, session::TokenPair},
        User,
    },
};
use tracing as log;

use crate::{
    config::Environment,
    context,
    define_error,
    middleware::{cache, rate_limit},
    AppState, AsError, Envelope, Error, Session,
};

/// Name of the cookie carrying the refresh [`session::Token`].
const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Path the refresh token cookie is restricted to.
const REFRESH_TOKEN_PATH: &str = "/api/v1/auth/refresh-token";

/// Prefix of the per-caller cached `GET /user` key family.
const AUTH_USER_PREFIX: &str = "auth_user_";

/// Builds the [`Router`] serving the `/auth` endpoints.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route(
            "/login",
            post(login)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::enforce,
                ))
                .route_layer(Extension(rate_limit::Kind::Default)),
        )
        .route(
            "/user",
            get(user)
                .route_layer(from_fn_with_state(state.clone(), cache::read))
                .route_layer(Extension(cache::ReadPolicy {
                    prefix: AUTH_USER_PREFIX,
                    suffix: cache::Suffix::Caller,
                }))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    context::authenticate,
                )),
        )
        .route(
            "/refresh-token",
            post(refresh_token)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::enforce,
                ))
                .route_layer(Extension(rate_limit::Kind::Refresh)),
        )
        .route(
            "/verify-account",
            patch(verify_account)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    cache::invalidate,
                ))
                .route_layer(Extension(cache::InvalidatePolicy {
                    prefixes: &[],
                    caller: Some(AUTH_USER_PREFIX),
                }))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    context::authenticate,
                ))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::enforce,
                ))
                .route_layer(Extension(rate_limit::Kind::Default)),
        )
        .route(
            "/resend/verify-token",
            post(resend_verify_token)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    context::authenticate,
                ))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::enforce,
                ))
                .route_layer(Extension(rate_limit::Kind::Default)),
        )
        .route(
            "/forgot-password",
            post(forgot_password)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::enforce,
                ))
                .route_layer(Extension(rate_limit::Kind::Default)),
        )
        .route(
            "/reset-password",
            patch(reset_password)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::enforce,
                ))
                .route_layer(Extension(rate_limit::Kind::Default)),
        )
        .route(
            "/logout",
            post(logout)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    cache::invalidate,
                ))
                .route_layer(Extension(cache::InvalidatePolicy {
                    prefixes: &[],
                    caller: Some(AUTH_USER_PREFIX),
                }))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    context::authenticate,
                )),
        )
}

/// `POST /create` request body.
#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    /// Full name of the new account.
    name: String,

    /// Email of the new account.
    email: String,

    /// Password of the new account.
    password: String,

    /// Phone number of the new account.
    phone: Option<String>,

    /// Birth date of the new account, as an RFC 3339 string.
    date_of_birth: Option<String>,
}

/// `POST /create` handler.
async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, Error> {
    let CreateUserRequest {
        name,
        email,
        password,
        phone,
        date_of_birth,
    } = req;

    let cmd = command::CreateUser {
        name: name.parse().map_err(|e| Error::bad_request(&e))?,
        email: email.parse().map_err(|e| Error::bad_request(&e))?,
        password: SecretBox::new(Box::new(
            password.parse().map_err(|e| Error::bad_request(&e))?,
        )),
        phone: phone
            .map(|p| p.parse::<user::Phone>())
            .transpose()
            .map_err(|e| Error::bad_request(&e))?,
        date_of_birth: date_of_birth
            .map(|d| common::DateTime::from_rfc3339(&d).map(|d| d.coerce()))
            .transpose()
            .map_err(|e| Error::bad_request(&e))?,
    };

    let out = state
        .service
        .execute(cmd)
        .await
        .map_err(AsError::into_error)?;
    // Delivery of the verification token is out-of-band.
    log::debug!("issued verification token for `User(id: {})`", out.user.id);

    Ok((
        http::StatusCode::CREATED,
        Json(Envelope::success(
            "Account created successfully",
            UserData {
                user: UserView::new(&out.user),
            },
        )),
    ))
}

/// `POST /login` request body.
#[derive(Debug, Deserialize)]
struct LoginRequest {
    /// Email of the account.
    email: String,

    /// Password of the account.
    password: String,
}

/// `POST /login` handler.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Envelope<SessionData>>), Error> {
    let LoginRequest { email, password } = req;

    let out = state
        .service
        .execute(command::CreateUserSession::ByCredentials {
            email: email.parse().map_err(|e| Error::bad_request(&e))?,
            password: SecretBox::new(Box::new(
                password.parse().map_err(|e| Error::bad_request(&e))?,
            )),
        })
        .await
        .map_err(AsError::into_error)?;

    let jar = jar.add(refresh_cookie(
        state.environment,
        &out.tokens.refresh,
        state.service.config().refresh_token_ttl,
    ));
    Ok((
        jar,
        Json(Envelope::success(
            "Logged in successfully",
            SessionData::new(&out.user, &out.tokens),
        )),
    ))
}

/// `GET /user` handler.
///
/// The response is cached per caller, so repeated calls within the cache TTL
/// return the bit-identical body.
async fn user(Extension(user): Extension<User>) -> Json<Envelope<UserData>> {
    Json(Envelope::success(
        "User fetched successfully",
        UserData {
            user: UserView::new(&user),
        },
    ))
}

/// `POST /refresh-token` handler.
///
/// Rotates the whole pair: the response carries a new access token and the
/// cookie a new refresh token.
async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Envelope<SessionData>>), Error> {
    let token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| {
            #[expect(unsafe_code, reason = "issued by this application")]
            unsafe {
                session::Token::new_unchecked(cookie.value().to_owned())
            }
        })
        .ok_or_else(|| Error::from(AuthApiError::MissingRefreshToken))?;

    let out = state
        .service
        .execute(command::RefreshUserSession { token })
        .await
        .map_err(AsError::into_error)?;

    let jar = jar.add(refresh_cookie(
        state.environment,
        &out.tokens.refresh,
        state.service.config().refresh_token_ttl,
    ));
    Ok((
        jar,
        Json(Envelope::success(
            "Session refreshed successfully",
            SessionData::new(&out.user, &out.tokens),
        )),
    ))
}

/// `PATCH /verify-account` request body.
#[derive(Debug, Deserialize)]
struct VerifyAccountRequest {
    /// Verification token delivered out-of-band.
    token: String,
}

/// `PATCH /verify-account` handler.
async fn verify_account(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<VerifyAccountRequest>,
) -> Result<Json<Envelope<UserData>>, Error> {
    let candidate = req
        .token
        .parse::<one_time::Value>()
        .map_err(|e| Error::bad_request(&e))?;

    let user = state
        .service
        .execute(command::ConsumeOneTimeToken::Verification {
            user_id: session.user_id,
            candidate,
        })
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(Envelope::success(
        "Account verified successfully",
        UserData {
            user: UserView::new(&user),
        },
    )))
}

/// `POST /resend/verify-token` handler.
async fn resend_verify_token(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Envelope>, Error> {
    let out = state
        .service
        .execute(command::IssueOneTimeToken {
            recipient: Recipient::ById(session.user_id),
            purpose: one_time::Purpose::Verification,
        })
        .await
        .map_err(AsError::into_error)?;
    log::debug!("reissued verification token for `User(id: {})`", out.user.id);

    Ok(Json(Envelope::ok("Verification token sent")))
}

/// `POST /forgot-password` request body.
#[derive(Debug, Deserialize)]
struct ForgotPasswordRequest {
    /// Email of the account to reset the password of.
    email: String,
}

/// `POST /forgot-password` handler.
///
/// Responds with `200` whether or not the email is registered, so the
/// endpoint cannot be used to probe for accounts.
async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<Envelope>, Error> {
    use command::issue_one_time_token::ExecutionError as E;

    const MESSAGE: &str =
        "If the email is registered, a reset token has been sent";

    let email = req
        .email
        .parse::<user::Email>()
        .map_err(|e| Error::bad_request(&e))?;

    match state
        .service
        .execute(command::IssueOneTimeToken {
            recipient: Recipient::ByEmail(email),
            purpose: one_time::Purpose::PasswordReset,
        })
        .await
    {
        Ok(out) => {
            log::debug!(
                "issued password reset token for `User(id: {})`",
                out.user.id,
            );
            Ok(Json(Envelope::ok(MESSAGE)))
        }
        Err(e) => match e.as_ref() {
            E::EmailNotExists(_) => Ok(Json(Envelope::ok(MESSAGE))),
            E::AlreadyVerified(_) | E::Db(_) | E::UserNotExists(_) => {
                Err(e.into_error())
            }
        },
    }
}

/// `PATCH /reset-password` request body.
#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    /// Email of the account to reset the password of.
    email: String,

    /// Reset token delivered out-of-band.
    token: String,

    /// New password to set.
    new_password: String,
}

/// `PATCH /reset-password` handler.
async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<Envelope>, Error> {
    let ResetPasswordRequest {
        email,
        token,
        new_password,
    } = req;

    drop(
        state
            .service
            .execute(command::ConsumeOneTimeToken::PasswordReset {
                email: email.parse().map_err(|e| Error::bad_request(&e))?,
                candidate: token
                    .parse::<one_time::Value>()
                    .map_err(|e| Error::bad_request(&e))?,
                new_password: SecretBox::new(Box::new(
                    new_password
                        .parse()
                        .map_err(|e| Error::bad_request(&e))?,
                )),
            })
            .await
            .map_err(AsError::into_error)?,
    );

    Ok(Json(Envelope::ok("Password reset successfully")))
}

/// `POST /logout` handler.
///
/// Clears the refresh token cookie. Already issued access tokens stay valid
/// until their own expiry.
async fn logout(jar: CookieJar) -> (CookieJar, Json<Envelope>) {
    let mut removal = Cookie::from(REFRESH_TOKEN_COOKIE);
    removal.set_path(REFRESH_TOKEN_PATH);
    let jar = jar.remove(removal);

    (jar, Json(Envelope::ok("Logged out successfully")))
}

/// Builds the cookie carrying the provided refresh [`session::Token`].
fn refresh_cookie(
    environment: Environment,
    token: &session::Token,
    ttl: Duration,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_TOKEN_COOKIE, token.to_string());
    cookie.set_http_only(true);
    cookie.set_path(REFRESH_TOKEN_PATH);
    cookie.set_max_age(time::Duration::try_from(ttl).ok());
    match environment {
        Environment::Production => {
            cookie.set_secure(true);
            cookie.set_same_site(SameSite::None);
        }
        Environment::Development => {
            cookie.set_secure(false);
            cookie.set_same_site(SameSite::Lax);
        }
    }
    cookie
}

/// Payload carrying a single [`UserView`].
#[derive(Debug, Serialize)]
struct UserData {
    /// The [`User`] itself.
    user: UserView,
}

/// Payload of a successful login or refresh.
#[derive(Debug, Serialize)]
struct SessionData {
    /// Authenticated [`User`].
    user: UserView,

    /// Fresh access token.
    access_token: String,

    /// [RFC 3339] expiry of the access token.
    ///
    /// [RFC 3339]: https://tools.ietf.org/html/rfc3339
    access_token_expires_at: String,
}

impl SessionData {
    /// Creates a new [`SessionData`] out of the provided [`User`] and
    /// [`TokenPair`].
    fn new(user: &User, tokens: &TokenPair) -> Self {
        Self {
            user: UserView::new(user),
            access_token: tokens.access.to_string(),
            access_token_expires_at: tokens.access_expires_at.to_rfc3339(),
        }
    }
}

/// Serializable projection of a [`User`].
#[derive(Debug, Serialize)]
struct UserView {
    /// ID of the [`User`].
    id: user::Id,

    /// Full name of the [`User`].
    name: String,

    /// Email of the [`User`].
    email: String,

    /// Phone number of the [`User`].
    phone: Option<String>,

    /// Birth date of the [`User`], as an RFC 3339 string.
    date_of_birth: Option<String>,

    /// Role of the [`User`].
    role: user::Role,

    /// Indicator whether the [`User`] has verified its account.
    is_verified: bool,

    /// Indicator whether the [`User`] has completed onboarding.
    ///
    /// Projected for `public` accounts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    is_onboarded: Option<bool>,

    /// [RFC 3339] creation timestamp of the [`User`].
    ///
    /// [RFC 3339]: https://tools.ietf.org/html/rfc3339
    created_at: String,
}

impl UserView {
    /// Creates a new [`UserView`] out of the provided [`User`].
    fn new(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.to_string(),
            email: user.email.to_string(),
            phone: user.phone.as_ref().map(ToString::to_string),
            date_of_birth: user.date_of_birth.map(|d| d.to_rfc3339()),
            role: user.role,
            is_verified: user.is_verified,
            is_onboarded: (user.role == user::Role::Public)
                .then_some(user.is_onboarded),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

impl AsError for command::create_user::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::EmailOccupied(_) => Some(AuthApiError::EmailOccupied.into()),
            Self::HashPassword(_) => None,
        }
    }
}

impl AsError for command::create_user_session::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::WrongCredentials => {
                Some(AuthApiError::WrongCredentials.into())
            }
            Self::JsonWebTokenEncodeError(_) | Self::UserNotExists(_) => None,
        }
    }
}

impl AsError for command::refresh_user_session::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::InvalidToken(_) | Self::UserNotExists(_) => {
                Some(AuthApiError::InvalidRefreshToken.into())
            }
            Self::JsonWebTokenEncodeError(_) => None,
        }
    }
}

impl AsError for command::issue_one_time_token::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::AlreadyVerified(_) => {
                Some(AuthApiError::AlreadyVerified.into())
            }
            Self::EmailNotExists(_) | Self::UserNotExists(_) => {
                Some(AuthApiError::UserNotFound.into())
            }
        }
    }
}

impl AsError for command::consume_one_time_token::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::WrongToken => Some(AuthApiError::InvalidOneTimeToken.into()),
            Self::HashPassword(_) => None,
        }
    }
}

define_error! {
    enum AuthApiError {
        #[code = "EMAIL_OCCUPIED"]
        #[status = CONFLICT]
        #[message = "Email is already registered"]
        EmailOccupied,

        #[code = "WRONG_CREDENTIALS"]
        #[status = UNAUTHORIZED]
        #[message = "Invalid email or password"]
        WrongCredentials,

        #[code = "MISSING_REFRESH_TOKEN"]
        #[status = UNAUTHORIZED]
        #[message = "Refresh token is missing"]
        MissingRefreshToken,

        #[code = "INVALID_REFRESH_TOKEN"]
        #[status = UNAUTHORIZED]
        #[message = "Invalid or expired refresh token"]
        InvalidRefreshToken,

        #[code = "INVALID_ONE_TIME_TOKEN"]
        #[status = BAD_REQUEST]
        #[message = "Invalid or expired token"]
        InvalidOneTimeToken,

        #[code = "ALREADY_VERIFIED"]
        #[status = BAD_REQUEST]
        #[message = "Account is already verified"]
        AlreadyVerified,

        #[code = "USER_NOT_FOUND"]
        #[status = NOT_FOUND]
        #[message = "User not found"]
        UserNotFound,
    }
}
