//! Flows a tree of HTML-like content onto fixed-size pages.
//!
//! The source tree is walked node by node and cloned onto the current page
//! until a [`GeometryProvider`](geometry::GeometryProvider) reports that it no
//! longer fits. The overflow is cut off at the exact element or character
//! where the page ends, and a [`BreakToken`] records where the next page
//! picks up.
//!
//! ```
//! use paged_flow::{Chunker, PaginationConfig, Pt};
//! use paged_flow::geometry::FlowGeometry;
//! use paged_flow::layout::Margins;
//!
//! let config = PaginationConfig::default()
//!     .with_page_size((Pt(120.0), Pt(48.0)))
//!     .with_margins(Margins::all(Pt(12.0)));
//! let geometry = FlowGeometry::default();
//! let paginated = Chunker::new(config, &geometry)
//!     .flow("<h1>Title</h1><p>Some words that take more than one page to show.</p>")
//!     .expect("can paginate");
//!
//! for page in paginated.pages() {
//!     println!("page {}: {:?}", page.number(), page.end_token.as_ref().map(|t| t.key()));
//! }
//! ```

/// Break markers: forced breaks, page sides and named pages
pub mod breaks;

mod chunker;
pub use chunker::*;

mod config;
pub use config::*;

mod document;
pub use document::*;

mod error;
pub use error::*;

/// Box geometry of rendered trees
pub mod geometry;

/// Flowing content onto one page
pub mod layout;

mod page;
pub use page::*;

/// Common page sizes
pub mod pagesize;

mod parser;
pub use parser::*;

mod rect;
pub use rect::*;

mod refs;
pub use refs::Ref;

mod section;
pub use section::*;

mod token;
pub use token::*;

mod units;
pub use units::*;
