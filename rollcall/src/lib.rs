pub mod handlers;

// Re-export commonly used handler helpers for convenience
pub use handlers::{
    data_dir_from, database_path, default_export_dir, progress_message, read_profiles_file,
    resolve_data_dir, status_lines,
};
