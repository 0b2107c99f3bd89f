pub mod provider;
pub mod reorder;
pub mod scroll_sync;
pub mod timeline;

pub use provider::StoryDataProvider;
pub use reorder::{Reconciliation, ReorderCoordinator, ReorderPlan, ReorderRequest};
pub use scroll_sync::{active_item_id, ScrollAction, ScrollSync};
pub use timeline::{project, ItemSet, Timeline};
