use crate::db::{DbPool, OrmConn};

/// Shared handles cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Raw sqlx pool for joined list queries and audit writes.
    pub pool: DbPool,
    /// SeaORM connection for entity work and the checkout transaction.
    pub orm: OrmConn,
}
