//! Fixed-capacity trade storage with generational handles.

use crate::domain::{Trade, TradeHandle, TradeId};
use crate::error::{EngineError, Storage};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    trade: Option<Trade>,
}

/// All trades of a run. Slots are reused after recycling; a recycled slot's
/// old handles and its trade id no longer resolve.
#[derive(Debug, Clone)]
pub struct TradeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<TradeId, TradeHandle>,
    capacity: usize,
}

impl TradeArena {
    pub fn new(capacity: usize) -> Self {
        Self { slots: Vec::new(), free: Vec::new(), by_id: HashMap::new(), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, trade: Trade) -> Result<TradeHandle, EngineError> {
        let id = trade.id;
        let handle = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.trade = Some(trade);
            TradeHandle { index, generation: slot.generation }
        } else {
            if self.slots.len() >= self.capacity {
                return Err(EngineError::CapacityExhausted {
                    storage: Storage::Trades,
                    capacity: self.capacity,
                });
            }
            self.slots.push(Slot { generation: 0, trade: Some(trade) });
            TradeHandle { index: (self.slots.len() - 1) as u32, generation: 0 }
        };
        if let Some(id) = id {
            self.by_id.insert(id, handle);
        }
        Ok(handle)
    }

    pub fn get(&self, h: TradeHandle) -> Option<&Trade> {
        let slot = self.slots.get(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.trade.as_ref()
    }

    pub fn get_mut(&mut self, h: TradeHandle) -> Option<&mut Trade> {
        let slot = self.slots.get_mut(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.trade.as_mut()
    }

    /// Register the id a trade received on fill (or on a partial close).
    pub fn index_id(&mut self, id: TradeId, h: TradeHandle) {
        self.by_id.insert(id, h);
    }

    pub fn find(&self, id: TradeId) -> Option<TradeHandle> {
        let h = *self.by_id.get(&id)?;
        self.get(h).map(|_| h)
    }

    /// Free the slot. The handle and the trade's id stop resolving.
    pub fn recycle(&mut self, h: TradeHandle) -> Option<Trade> {
        let slot = self.slots.get_mut(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        let trade = slot.trade.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(h.index);
        if let Some(id) = trade.id {
            if self.by_id.get(&id) == Some(&h) {
                self.by_id.remove(&id);
            }
        }
        Some(trade)
    }

    /// Handles of occupied slots in slot order.
    pub fn handles(&self) -> Vec<TradeHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.trade.is_some())
            .map(|(i, s)| TradeHandle { index: i as u32, generation: s.generation })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TradeHandle, &Trade)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.trade
                .as_ref()
                .map(|t| (TradeHandle { index: i as u32, generation: s.generation }, t))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, Side, StatusKey};

    fn trade(id: Option<u32>) -> Trade {
        let mut t = Trade::new(Side::Long, AssetId(0), StatusKey::new("", AssetId(0), Side::Long), 0);
        t.id = id.map(TradeId);
        t
    }

    #[test]
    fn recycled_handle_and_id_do_not_resolve() {
        let mut arena = TradeArena::new(4);
        let h = arena.insert(trade(Some(1))).unwrap();
        assert_eq!(arena.find(TradeId(1)), Some(h));
        arena.recycle(h).unwrap();
        assert!(arena.get(h).is_none());
        assert!(arena.find(TradeId(1)).is_none());

        let h2 = arena.insert(trade(Some(2))).unwrap();
        assert_eq!(h2.index, h.index);
        assert_ne!(h2.generation, h.generation);
        assert!(arena.get(h).is_none());
        assert!(arena.recycle(h).is_none());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut arena = TradeArena::new(2);
        arena.insert(trade(None)).unwrap();
        let h = arena.insert(trade(None)).unwrap();
        assert!(matches!(
            arena.insert(trade(None)),
            Err(EngineError::CapacityExhausted { storage: Storage::Trades, capacity: 2 })
        ));
        arena.recycle(h);
        assert!(arena.insert(trade(None)).is_ok());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn handles_in_slot_order() {
        let mut arena = TradeArena::new(8);
        let a = arena.insert(trade(None)).unwrap();
        let b = arena.insert(trade(None)).unwrap();
        let c = arena.insert(trade(None)).unwrap();
        arena.recycle(b);
        assert_eq!(arena.handles(), vec![a, c]);
        assert_eq!(arena.iter().count(), 2);
    }
}
