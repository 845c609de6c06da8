pub mod identifier;
pub mod url_host;
