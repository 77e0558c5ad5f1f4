use uuid::Uuid;

/**
 * How long (milliseconds) one discovery round listens for advertisements.
 */
pub const SCAN_DURATION: u64 = 5000;

/**
 * How long (milliseconds) to wait between two discovery rounds.
 */
pub const SCAN_INTER_ROUND_DELAY: u64 = 10000;

/**
 * How long (milliseconds) a connection attempt may take.
 */
pub const CONNECT_TIMEOUT: u64 = 30000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) closing the link to a printer may take.
 */
pub const DISCONNECT_DEADLINE: u64 = 2000;

/**
 * How often (milliseconds) to check whether a bluetooth adapter is present.
 */
pub const ADAPTER_POLL_DELAY: u64 = 1000;

/**
 * How often (milliseconds) to check for readiness while waiting for a printer.
 */
pub const READY_POLL_DELAY: u64 = 100;

/**
 * The UUID of the Bluetooth BLE service of the white label receipt printer.
 * Other printers advertise a different one, use a bluetooth explorer app to find it.
 */
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0xE7810A71_73AE_499D_8C15_FAA9AEF0C3F2);

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that accepts print data.
 */
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xBEF8D6C9_9C21_4C9E_B632_BD58C1009F9F);
