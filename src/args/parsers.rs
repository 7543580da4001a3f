use super::types::{ListenAddress, PositiveU64, PositiveUsize};
use crate::error::{AppError, AppResult};

pub(super) fn parse_positive_u64(s: &str) -> AppResult<PositiveU64> {
    s.parse::<PositiveU64>().map_err(AppError::from)
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

pub(crate) fn parse_listen_address(s: &str) -> AppResult<ListenAddress> {
    s.parse::<ListenAddress>().map_err(AppError::from)
}
