pub mod dot;
pub mod json;
pub mod text;
