//! Storefront sync extension endpoints.

/// Storefront, platform, and extension versions.
pub const INFO: &str = "shipstream/v1/info";
/// Storefront-side full inventory sync.
pub const SYNC_INVENTORY: &str = "shipstream/v1/sync_inventory";
/// Extension configuration (fulfillment-service registration).
pub const SET_CONFIG: &str = "shipstream/v1/set_config";
/// Orders modified within a time window.
pub const ORDER_LIST: &str = "shipstream/v1/order/list";
/// Full order record by order number.
pub const ORDER_INFO: &str = "shipstream/v1/order_shipment/info";
/// Order comment with status transition.
pub const ORDER_ADD_COMMENT: &str = "shipstream/v1/order/add_comment";
/// Single-SKU stock delta.
pub const STOCK_ITEM_ADJUST: &str = "shipstream/v1/stock_item/adjust";
/// Storefront shipment with tracking numbers.
pub const SHIPMENT_CREATE_WITH_TRACKING: &str =
    "shipstream/v1/order_shipment/create_with_tracking";

/// Extension config path holding the warehouse callback URL.
pub const WAREHOUSE_API_URL_PATH: &str = "warehouse_api_url";
