//! Redraft Server Library
//!
//! PDF pages reconstructed as editable HTML, edited in a server-held
//! session and rasterized back into a PDF. The HTTP binary is in main.rs.
//!
//! # Modules
//!
//! - `pdf`: MuPDF parsing and lopdf image extraction
//! - `html`: page reconstruction and lol_html rewrites
//! - `editor`: editing surface, repagination and the content observer
//! - `session`: page/session state and document loading
//! - `export`: image repair, rasterization and PDF assembly
//! - `ocr` / `enrich`: OCR providers and the server enrichment pass
//! - `routes`: the axum router

pub mod config;
pub mod editor;
pub mod enrich;
pub mod error;
pub mod export;
pub mod html;
pub mod ocr;
pub mod pdf;
pub mod routes;
pub mod session;
pub mod state;

#[cfg(test)]
mod test_support;
