pub mod hotel_date;

pub use hotel_date::resolve_run_date;
