pub mod path_utils;

pub use path_utils::{final_component, join_path, normalize_path, relative_components};
