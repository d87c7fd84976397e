//! [`Command`] definition.

pub mod authorize_user_session;
pub mod consume_one_time_token;
pub mod create_product;
pub mod create_user;
pub mod create_user_session;
pub mod delete_product;
pub mod issue_one_time_token;
pub mod refresh_user_session;
pub mod update_product;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    authorize_user_session::AuthorizeUserSession,
    consume_one_time_token::ConsumeOneTimeToken,
    create_product::CreateProduct, create_user::CreateUser,
    create_user_session::CreateUserSession, delete_product::DeleteProduct,
    issue_one_time_token::IssueOneTimeToken,
    refresh_user_session::RefreshUserSession, update_product::UpdateProduct,
};
