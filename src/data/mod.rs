pub mod bar;
pub mod loader;

pub use bar::{validate_series, Bar, BarError};
pub use loader::{filter_by_range, filter_by_symbol, load_csv, load_csv_records, SymbolBar};
