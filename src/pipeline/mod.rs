//! Pipeline stages for photo-to-coloring-page conversion.
//!
//! Each submodule implements one step. The wizard strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ upload ──▶ crop ──▶ encode ──▶ service ──▶ (gallery)
//! (path/URL) (sniff)   (rotate   (PNG,     (gemini or
//!                       + cut)    data URI)  endpoint)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL into memory
//! 2. [`upload`]: accept image bytes, issue revocable preview handles
//! 3. [`crop`]: rotate about the centre and cut the page-aspect rectangle
//! 4. [`encode`]: PNG-encode and base64-wrap for the service request body
//! 5. [`service`]: the injected conversion boundary; [`gemini`] calls the
//!    image model per page, [`endpoint`] forwards whole batches to a host

pub mod crop;
pub mod encode;
pub mod endpoint;
pub mod gemini;
pub mod input;
pub mod service;
pub mod upload;
