/*!
 * SQLite persistence for the translation pipeline.
 *
 * - `connection`: shared connection with async helpers
 * - `schema`: table definitions and versioning
 * - `models`: row types and status enums
 * - `store`: typed operations used by the controller and orchestrator
 */

pub mod connection;
pub mod models;
pub mod schema;
pub mod store;

pub use connection::DatabaseConnection;
pub use store::Store;
