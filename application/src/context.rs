//! Request authentication definitions.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use service::{
    command::{self, Command as _},
    domain::user::{self, session},
};

use crate::{define_error, AppState, AsError, Error};

/// Authenticated user session of the current request.
///
/// Inserted into request extensions by [`authenticate`], so any middleware or
/// handler layered under it can pick it up.
#[derive(Clone, Debug)]
pub struct Session {
    /// ID of the [`user::User`] this [`Session`] belongs to.
    pub user_id: user::Id,

    /// [`user::Role`] of the [`user::User`].
    pub role: user::Role,

    /// Bearer [`session::Token`] the request was authenticated with.
    pub token: session::Token,
}

/// Middleware authenticating the request with its `Authorization: Bearer`
/// header.
///
/// On success inserts a [`Session`] and the authenticated [`user::User`] into
/// the request extensions.
///
/// # Errors
///
/// Errors if the header is missing or malformed, or the provided token is
/// invalid.
pub async fn authenticate(
    State(state): State<AppState>,
    header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, Error> {
    let TypedHeader(Authorization(bearer)) = header.map_err(|e| {
        if e.is_missing() {
            AuthError::AuthorizationRequired.into()
        } else {
            e.into_error()
        }
    })?;

    #[expect(unsafe_code, reason = "specified in correct header")]
    let token = unsafe {
        session::Token::new_unchecked(bearer.token().to_owned())
    };

    let out = state
        .service
        .execute(command::AuthorizeUserSession {
            token: token.clone(),
        })
        .await
        .map_err(AsError::into_error)?;

    let session = Session {
        user_id: out.user.id,
        role: out.user.role,
        token,
    };
    _ = req.extensions_mut().insert(session);
    _ = req.extensions_mut().insert(out.user);

    Ok(next.run(req).await)
}

/// Middleware restricting the request to `admin` [`user::User`]s.
///
/// Must be layered under [`authenticate`].
///
/// # Errors
///
/// Errors if the request is not authenticated, or the authenticated
/// [`user::User`] is not an `admin`.
pub async fn require_admin(
    req: Request,
    next: Next,
) -> Result<Response, Error> {
    let role = req
        .extensions()
        .get::<Session>()
        .map(|s| s.role)
        .ok_or_else(|| Error::from(AuthError::AuthorizationRequired))?;
    if role != user::Role::Admin {
        return Err(AuthError::AdminOnly.into());
    }

    Ok(next.run(req).await)
}

impl AsError for command::authorize_user_session::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::InvalidToken(_) | Self::UserNotExists(_) => {
                Some(AuthError::AuthorizationRequired.into())
            }
        }
    }
}

define_error! {
    enum AuthError {
        #[code = "AUTHORIZATION_REQUIRED"]
        #[status = UNAUTHORIZED]
        #[message = "Authorization required"]
        AuthorizationRequired,

        #[code = "ADMIN_ONLY"]
        #[status = FORBIDDEN]
        #[message = "Admin access required"]
        AdminOnly,
    }
}
