// Queries shared by the MySQL and SQLite stores. Both engines accept
// backtick-quoted identifiers and CASE expressions, so one text serves both.

use super::ConfigColumn;

/// Configuration, lifetime energy and range added by the active session, or
/// by the most recent session when none is active.
pub(crate) const CONFIG_ROW_QUERY: &str = "SELECT \
      `wallbox_config`.`lock`, \
      `wallbox_config`.`charging_enable`, \
      `wallbox_config`.`max_charging_current`, \
      `wallbox_config`.`halo_brightness`, \
      `power_outage_values`.`charged_energy` AS cumulative_added_energy, \
      CASE WHEN `active_session`.`unique_id` != 0 \
        THEN `active_session`.`charged_range` \
        ELSE `latest_session`.`charged_range` END AS added_range \
    FROM `wallbox_config`, \
      `active_session`, \
      `power_outage_values`, \
      (SELECT * FROM `session` ORDER BY `id` DESC LIMIT 1) AS latest_session";

pub(crate) const SERIAL_NUMBER_QUERY: &str = "SELECT `serial_num` FROM `charger_info`";

/// User 1 is the built-in admin account.
pub(crate) const LATEST_USER_QUERY: &str =
    "SELECT `user_id` FROM `users` WHERE `user_id` != 1 ORDER BY `user_id` DESC LIMIT 1";

pub(crate) const AVAILABLE_CURRENT_QUERY: &str =
    "SELECT `max_avbl_current` FROM `state_values` ORDER BY `id` DESC LIMIT 1";

/// Column names come from a closed enum, never from a payload.
pub(crate) fn update_config_statement(column: ConfigColumn) -> String {
    format!("UPDATE `wallbox_config` SET `{}` = ?", column.column_name())
}
