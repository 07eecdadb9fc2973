//! Serial number registry.
//!
//! Every serial keeps its movement history ordered by posting. A serial is
//! "in" a warehouse after an inward movement until the next outward one.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use kardex_shared::types::{SerialNo, VoucherId, WarehouseCode};
use serde::{Deserialize, Serialize};

use crate::stock::{PostingKey, StockError, StockResult};

/// Direction of a serial movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialDirection {
    /// Into the warehouse.
    In,
    /// Out of the warehouse.
    Out,
}

/// One movement of one serial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialMovement {
    /// The voucher that moved it.
    pub voucher_id: VoucherId,
    /// Warehouse moved into or out of.
    pub warehouse: WarehouseCode,
    /// Ordering key.
    pub posting: PostingKey,
    /// Direction.
    pub direction: SerialDirection,
    /// Whether the voucher was cancelled.
    pub is_cancelled: bool,
}

/// Movement history of every serial.
#[derive(Debug, Clone, Default)]
pub struct SerialRegistry {
    movements: HashMap<SerialNo, Vec<SerialMovement>>,
    sequence: u64,
}

impl SerialRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a serial received into `warehouse`.
    ///
    /// # Errors
    ///
    /// - `SerialNoExistsInFutureTransaction` if the serial moved after
    ///   `posted_at`
    /// - `SerialNoDuplicate` if the serial is already in stock at `posted_at`
    pub fn receive(
        &mut self,
        serial: &SerialNo,
        warehouse: &WarehouseCode,
        voucher_id: VoucherId,
        posted_at: NaiveDateTime,
    ) -> StockResult<()> {
        self.ensure_no_future_movement(serial, posted_at)?;
        if let Some(last) = self.last_active(serial)
            && last.direction == SerialDirection::In
        {
            return Err(StockError::SerialNoDuplicate {
                serial: serial.clone(),
                warehouse: last.warehouse.clone(),
            });
        }
        self.record(serial, warehouse, voucher_id, posted_at, SerialDirection::In);
        Ok(())
    }

    /// Records a serial issued from `warehouse`.
    ///
    /// # Errors
    ///
    /// - `SerialNoExistsInFutureTransaction` if the serial moved after
    ///   `posted_at`
    /// - `SerialNoNotInWarehouse` if the serial is not in `warehouse`
    pub fn issue(
        &mut self,
        serial: &SerialNo,
        warehouse: &WarehouseCode,
        voucher_id: VoucherId,
        posted_at: NaiveDateTime,
    ) -> StockResult<()> {
        self.ensure_no_future_movement(serial, posted_at)?;
        let in_warehouse = self.last_active(serial).is_some_and(|last| {
            last.direction == SerialDirection::In && &last.warehouse == warehouse
        });
        if !in_warehouse {
            return Err(StockError::SerialNoNotInWarehouse {
                serial: serial.clone(),
                warehouse: warehouse.clone(),
            });
        }
        self.record(serial, warehouse, voucher_id, posted_at, SerialDirection::Out);
        Ok(())
    }

    /// Flags every movement of a voucher cancelled.
    ///
    /// # Errors
    ///
    /// Returns `SerialNoExistsInFutureTransaction` if another voucher moved
    /// one of the serials afterwards.
    pub fn cancel_voucher(&mut self, voucher_id: VoucherId) -> StockResult<()> {
        for (serial, movements) in &self.movements {
            let Some(own) = movements
                .iter()
                .filter(|m| m.voucher_id == voucher_id && !m.is_cancelled)
                .map(|m| m.posting)
                .max()
            else {
                continue;
            };
            if let Some(later) = movements
                .iter()
                .find(|m| !m.is_cancelled && m.voucher_id != voucher_id && m.posting > own)
            {
                return Err(StockError::SerialNoExistsInFutureTransaction {
                    serial: serial.clone(),
                    posted_at: later.posting.posted_at,
                });
            }
        }

        for movement in self.movements.values_mut().flatten() {
            if movement.voucher_id == voucher_id {
                movement.is_cancelled = true;
            }
        }
        Ok(())
    }

    /// Current warehouse of a serial, if it is in stock.
    #[must_use]
    pub fn location(&self, serial: &SerialNo) -> Option<&WarehouseCode> {
        self.last_active(serial)
            .filter(|last| last.direction == SerialDirection::In)
            .map(|last| &last.warehouse)
    }

    /// The subset of `serials` currently in `warehouse`, in input order.
    #[must_use]
    pub fn in_warehouse(&self, serials: &[SerialNo], warehouse: &WarehouseCode) -> Vec<SerialNo> {
        serials
            .iter()
            .filter(|serial| self.location(serial) == Some(warehouse))
            .cloned()
            .collect()
    }

    /// Movement history of a serial, oldest first.
    #[must_use]
    pub fn history(&self, serial: &SerialNo) -> &[SerialMovement] {
        self.movements
            .get(serial)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn last_active(&self, serial: &SerialNo) -> Option<&SerialMovement> {
        self.movements
            .get(serial)?
            .iter()
            .rev()
            .find(|m| !m.is_cancelled)
    }

    fn ensure_no_future_movement(&self, serial: &SerialNo, posted_at: NaiveDateTime) -> StockResult<()> {
        if let Some(later) = self
            .movements
            .get(serial)
            .into_iter()
            .flatten()
            .find(|m| !m.is_cancelled && m.posting.posted_at > posted_at)
        {
            return Err(StockError::SerialNoExistsInFutureTransaction {
                serial: serial.clone(),
                posted_at: later.posting.posted_at,
            });
        }
        Ok(())
    }

    fn record(
        &mut self,
        serial: &SerialNo,
        warehouse: &WarehouseCode,
        voucher_id: VoucherId,
        posted_at: NaiveDateTime,
        direction: SerialDirection,
    ) {
        self.sequence += 1;
        self.movements
            .entry(serial.clone())
            .or_default()
            .push(SerialMovement {
                voucher_id,
                warehouse: warehouse.clone(),
                posting: PostingKey::new(posted_at, self.sequence),
                direction,
                is_cancelled: false,
            });
    }
}
