mod bson;
mod collection;
mod counter;

pub use bson::{opt_chrono_datetime_as_bson_datetime, session_id_filter, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_session_id_counter_exists, Counter, SESSION_ID_COUNTER_ID};
