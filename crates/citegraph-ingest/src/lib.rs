//! citegraph ingest: Semantic Scholar fetching, graph upserts, reference expansion and refresh.

pub mod context;
pub mod error;
pub mod expand;
pub mod http;
pub mod pagination;
pub mod rate_limit;
pub mod refresh;
pub mod sources;
pub mod upsert;

pub use context::IngestContext;
pub use error::{IngestError, Result};
pub use expand::{ExpansionFailure, ExpansionReport, PaperExpander, ReferenceExpander};
pub use http::{HttpResponse, RateLimitedClient, ReqwestTransport, Transport};
pub use pagination::fetch_all;
pub use rate_limit::{FixedWindowLimiter, RetryPolicy};
pub use refresh::{BulkRefreshScheduler, RefreshProgress, RefreshSummary};
pub use sources::{CitationSource, NeighborKind, SemanticScholarSource};
pub use upsert::{GraphUpsertClient, UpsertStats};
