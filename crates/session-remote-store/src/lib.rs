//! Remote per-user token store.
//!
//! [`RemoteTokenStore`] is the contract the session manager writes through
//! to; [`SupabaseTokenStore`] implements it on top of a PostgREST table with
//! one row per user.

mod error;
mod record;
mod supabase_client;
mod traits;

pub use error::{RemoteError, RemoteResult};
pub use record::RemoteTokenRecord;
pub use supabase_client::SupabaseTokenStore;
pub use traits::RemoteTokenStore;
