//! Product catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use common::pagination;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service::{
    command::{self, Command as _},
    domain::{product, Product},
    query::products,
    read, Query as _,
};

use crate::{
    context, define_error,
    middleware::{cache, rate_limit},
    AppState, AsError, Envelope, Error,
};

/// Cache key of the full catalog listing.
const PRODUCTS_ALL_KEY: &str = "products_all";

/// Prefix of per-product cache keys.
const PRODUCT_PREFIX: &str = "product_";

/// Prefix of per-category listing cache keys.
const PRODUCTS_CATEGORY_PREFIX: &str = "products_category_";

/// Key families evicted by every catalog mutation.
const MUTATION_EVICTS: &[&str] =
    &[PRODUCTS_ALL_KEY, PRODUCT_PREFIX, PRODUCTS_CATEGORY_PREFIX];

/// Builds the [`Router`] serving the `/products` endpoints.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/all",
            get(all)
                .route_layer(from_fn_with_state(state.clone(), cache::read))
                .route_layer(Extension(cache::ReadPolicy {
                    prefix: PRODUCTS_ALL_KEY,
                    suffix: cache::Suffix::None,
                })),
        )
        .route(
            "/category/:category",
            get(by_category)
                .route_layer(from_fn_with_state(state.clone(), cache::read))
                .route_layer(Extension(cache::ReadPolicy {
                    prefix: PRODUCTS_CATEGORY_PREFIX,
                    suffix: cache::Suffix::PathTail,
                })),
        )
        .route(
            "/:id",
            get(by_id)
                .route_layer(from_fn_with_state(state.clone(), cache::read))
                .route_layer(Extension(cache::ReadPolicy {
                    prefix: PRODUCT_PREFIX,
                    suffix: cache::Suffix::PathTail,
                })),
        )
        .route(
            "/create",
            post(create)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    cache::invalidate,
                ))
                .route_layer(Extension(cache::InvalidatePolicy {
                    prefixes: MUTATION_EVICTS,
                    caller: None,
                }))
                .route_layer(from_fn(context::require_admin))
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
            "/update/:id",
            patch(update)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    cache::invalidate,
                ))
                .route_layer(Extension(cache::InvalidatePolicy {
                    prefixes: MUTATION_EVICTS,
                    caller: None,
                }))
                .route_layer(from_fn(context::require_admin))
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
            "/delete/:id",
            delete(remove)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    cache::invalidate,
                ))
                .route_layer(Extension(cache::InvalidatePolicy {
                    prefixes: MUTATION_EVICTS,
                    caller: None,
                }))
                .route_layer(from_fn(context::require_admin))
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
}

/// Pagination and search parameters of listing endpoints.
#[derive(Debug, Deserialize)]
struct ListQuery {
    /// 1-based page number.
    page: Option<u32>,

    /// Page size.
    limit: Option<u32>,

    /// Free-text term to search names and categories for.
    query: Option<String>,
}

/// `GET /all` handler.
async fn all(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Envelope<ProductsData>>, Error> {
    let selector = read::product::list::Selector {
        filter: read::product::list::Filter::new(q.query.as_deref(), None),
        page: pagination::Arguments::new(q.page, q.limit),
    };

    let page = state
        .service
        .execute(products::List::by(selector))
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(Envelope::success(
        "Products fetched successfully",
        ProductsData::new(page),
    )))
}

/// `GET /category/:category` handler.
///
/// The match is case-insensitive.
async fn by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Envelope<ProductsData>>, Error> {
    let category = category
        .parse::<product::Category>()
        .map_err(|e| Error::bad_request(&e))?;

    let selector = read::product::list::Selector {
        filter: read::product::list::Filter::new(
            q.query.as_deref(),
            Some(category),
        ),
        page: pagination::Arguments::new(q.page, q.limit),
    };

    let page = state
        .service
        .execute(products::List::by(selector))
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(Envelope::success(
        "Products fetched successfully",
        ProductsData::new(page),
    )))
}

/// `GET /:id` handler.
async fn by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProductData>>, Error> {
    let id = id
        .parse::<product::Id>()
        .map_err(|e| Error::bad_request(&e))?;

    let product = state
        .service
        .execute(service::query::product::ById::by(id))
        .await
        .map_err(AsError::into_error)?
        .ok_or_else(|| Error::from(ProductApiError::NotFound))?;

    Ok(Json(Envelope::success(
        "Product fetched successfully",
        ProductData {
            product: ProductView::new(&product),
        },
    )))
}

/// `POST /create` request body.
#[derive(Debug, Deserialize)]
struct CreateProductRequest {
    /// Name of the new product.
    name: String,

    /// Description of the new product.
    description: String,

    /// Non-negative price of the new product.
    price: f64,

    /// Category of the new product.
    category: String,

    /// Stock quantity of the new product.
    stock: Option<u32>,

    /// Availability of the new product.
    available: Option<bool>,
}

/// `POST /create` handler.
async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, Error> {
    let CreateProductRequest {
        name,
        description,
        price,
        category,
        stock,
        available,
    } = req;

    let cmd = command::CreateProduct {
        name: name.parse().map_err(|e| Error::bad_request(&e))?,
        description: description
            .parse()
            .map_err(|e| Error::bad_request(&e))?,
        price: parse_price(price)?,
        category: category.parse().map_err(|e| Error::bad_request(&e))?,
        stock: stock.unwrap_or(0),
        available: available.unwrap_or(true),
    };

    let product = state
        .service
        .execute(cmd)
        .await
        .map_err(AsError::into_error)?;

    Ok((
        http::StatusCode::CREATED,
        Json(Envelope::success(
            "Product created successfully",
            ProductData {
                product: ProductView::new(&product),
            },
        )),
    ))
}

/// `PATCH /update/:id` request body.
#[derive(Debug, Deserialize)]
struct UpdateProductRequest {
    /// New name of the product.
    name: Option<String>,

    /// New description of the product.
    description: Option<String>,

    /// New non-negative price of the product.
    price: Option<f64>,

    /// New category of the product.
    category: Option<String>,

    /// New stock quantity of the product.
    stock: Option<u32>,

    /// New availability of the product.
    available: Option<bool>,
}

/// `PATCH /update/:id` handler.
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Envelope<ProductData>>, Error> {
    let UpdateProductRequest {
        name,
        description,
        price,
        category,
        stock,
        available,
    } = req;

    let cmd = command::UpdateProduct {
        id: id.parse().map_err(|e| Error::bad_request(&e))?,
        name: name
            .map(|n| n.parse())
            .transpose()
            .map_err(|e| Error::bad_request(&e))?,
        description: description
            .map(|d| d.parse())
            .transpose()
            .map_err(|e| Error::bad_request(&e))?,
        price: price.map(parse_price).transpose()?,
        category: category
            .map(|c| c.parse())
            .transpose()
            .map_err(|e| Error::bad_request(&e))?,
        stock,
        available,
    };

    let product = state
        .service
        .execute(cmd)
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(Envelope::success(
        "Product updated successfully",
        ProductData {
            product: ProductView::new(&product),
        },
    )))
}

/// `DELETE /delete/:id` handler.
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProductData>>, Error> {
    let id = id
        .parse::<product::Id>()
        .map_err(|e| Error::bad_request(&e))?;

    let product = state
        .service
        .execute(command::DeleteProduct { id })
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(Envelope::success(
        "Product deleted successfully",
        ProductData {
            product: ProductView::new(&product),
        },
    )))
}

/// Parses the provided raw `price` into a [`product::Price`].
fn parse_price(price: f64) -> Result<product::Price, Error> {
    Decimal::try_from(price)
        .ok()
        .and_then(product::Price::new)
        .ok_or_else(|| Error::bad_request(&"price must be a non-negative number"))
}

/// Payload carrying a single [`ProductView`].
#[derive(Debug, Serialize)]
struct ProductData {
    /// The [`Product`] itself.
    product: ProductView,
}

/// Payload carrying a page of [`ProductView`]s.
#[derive(Debug, Serialize)]
struct ProductsData {
    /// [`Product`]s of the page.
    products: Vec<ProductView>,

    /// Pagination metadata of the page.
    meta: pagination::Meta,
}

impl ProductsData {
    /// Creates a new [`ProductsData`] out of the provided page.
    fn new(page: pagination::Page<Product>) -> Self {
        Self {
            products: page.items.iter().map(ProductView::new).collect(),
            meta: page.meta,
        }
    }
}

/// Serializable projection of a [`Product`].
#[derive(Debug, Serialize)]
struct ProductView {
    /// ID of the [`Product`].
    id: product::Id,

    /// Name of the [`Product`].
    name: String,

    /// Description of the [`Product`].
    description: String,

    /// Price of the [`Product`].
    price: Decimal,

    /// Category of the [`Product`].
    category: String,

    /// Stock quantity of the [`Product`].
    stock: u32,

    /// Availability of the [`Product`].
    available: bool,

    /// [RFC 3339] creation timestamp of the [`Product`].
    ///
    /// [RFC 3339]: https://tools.ietf.org/html/rfc3339
    created_at: String,
}

impl ProductView {
    /// Creates a new [`ProductView`] out of the provided [`Product`].
    fn new(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.to_string(),
            description: product.description.to_string(),
            price: product.price.amount(),
            category: product.category.to_string(),
            stock: product.stock,
            available: product.available,
            created_at: product.created_at.to_rfc3339(),
        }
    }
}

impl AsError for command::create_product::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
        }
    }
}

impl AsError for command::update_product::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::ProductNotExists(_) => {
                Some(ProductApiError::NotFound.into())
            }
        }
    }
}

impl AsError for command::delete_product::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::ProductNotExists(_) => {
                Some(ProductApiError::NotFound.into())
            }
        }
    }
}

define_error! {
    enum ProductApiError {
        #[code = "PRODUCT_NOT_FOUND"]
        #[status = NOT_FOUND]
        #[message = "Product not found"]
        NotFound,
    }
}
