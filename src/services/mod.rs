/// Service managers
///
/// One manager per external binary. Startup order is node before indexer
/// (the indexer needs the node's cookie); shutdown order is the reverse.
pub mod indexer;
pub mod node;
pub mod recovery;

pub use indexer::IndexerService;
pub use node::NodeService;
