//! Order records, display derivation and role resolution
//!
//! Everything here is pure: no I/O, no wallet access. The source and the
//! coordinators feed these functions with backend records and wallet addresses.

pub mod model;
pub mod role;
pub mod transformer;
pub mod view;

pub use model::{
    ChainOrderBook, DisplayOrder, MalformedOrder, Order, OrderId, OrderStatus, RawOrder,
    MICRO_UNITS_PER_UNIT,
};
pub use role::{addresses_equal, normalize_address, OrderActions, PendingFlags, Role, RoleResolver};
pub use transformer::OrderTransformer;
pub use view::{OrderFilter, SortOrder};
