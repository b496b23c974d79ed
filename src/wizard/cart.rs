use crate::model::{CartLine, CatalogItem};

/// Cart lines keyed by catalog item id. Every stored line has quantity ≥ 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add one unit of `item`. Returns the line's new quantity.
    pub fn add(&mut self, item: &CatalogItem) -> u32 {
        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item.id) {
            line.quantity = line.quantity.saturating_add(1);
            return line.quantity;
        }
        self.lines.push(CartLine::from_item(item));
        1
    }

    /// Change a line's quantity by `delta`. A line that drops to zero or below
    /// is removed. Returns the remaining quantity, `None` if the line is gone or
    /// never existed.
    pub fn adjust(&mut self, item_id: i64, delta: i64) -> Option<u32> {
        let idx = self.lines.iter().position(|l| l.item_id == item_id)?;
        let next = i64::from(self.lines[idx].quantity).saturating_add(delta);
        if next <= 0 {
            self.lines.remove(idx);
            return None;
        }
        let qty = u32::try_from(next).unwrap_or(u32::MAX);
        self.lines[idx].quantity = qty;
        Some(qty)
    }

    pub fn remove(&mut self, item_id: i64) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != item_id);
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Σ unit price × quantity, computed from the lines on every call.
    pub fn total(&self) -> f64 {
        self.lines.iter().map(CartLine::amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn item(id: i64, price: f64) -> CatalogItem {
        CatalogItem {
            id,
            name: format!("item-{id}"),
            price: Some(price),
            unit: None,
        }
    }

    #[test]
    fn adding_same_item_increments_quantity() {
        let mut cart = Cart::default();
        let widget = item(7, 150.0);
        for n in 1..=5 {
            assert_eq!(cart.add(&widget), n);
        }
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
    }

    #[test]
    fn decrement_to_zero_removes_line() {
        let mut cart = Cart::default();
        cart.add(&item(1, 10.0));
        cart.add(&item(1, 10.0));
        assert_eq!(cart.adjust(1, -1), Some(1));
        assert_eq!(cart.adjust(1, -1), None);
        assert!(cart.is_empty());
        assert_eq!(cart.adjust(1, 1), None);
    }

    #[test]
    fn large_negative_delta_removes_line() {
        let mut cart = Cart::default();
        cart.add(&item(1, 10.0));
        assert_eq!(cart.adjust(1, -100), None);
        assert!(cart.is_empty());
    }

    #[test]
    fn total_tracks_mutations_and_is_stable() {
        let mut cart = Cart::default();
        cart.add(&item(1, 100.0));
        cart.add(&item(2, 25.5));
        cart.add(&item(2, 25.5));
        assert_eq!(cart.total(), 151.0);
        assert_eq!(cart.total(), cart.total());
        cart.remove(1);
        assert_eq!(cart.total(), 51.0);
        cart.adjust(2, 3);
        assert_eq!(cart.total(), 127.5);
        cart.clear();
        assert_eq!(cart.total(), 0.0);
    }

    #[test]
    fn random_operation_sequences_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let catalog: Vec<CatalogItem> = (1..=6).map(|i| item(i, i as f64 * 3.0)).collect();
        let mut cart = Cart::default();

        for _ in 0..2_000 {
            let id = rng.gen_range(1..=6);
            match rng.gen_range(0..4) {
                0 => {
                    cart.add(&catalog[(id - 1) as usize]);
                }
                1 => {
                    cart.adjust(id, rng.gen_range(-3..=3));
                }
                2 => {
                    cart.remove(id);
                }
                _ => {
                    cart.adjust(id, -1);
                }
            }

            assert!(cart.lines().iter().all(|l| l.quantity > 0));
            let mut ids: Vec<i64> = cart.lines().iter().map(|l| l.item_id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), cart.lines().len());
            let expected: f64 = cart
                .lines()
                .iter()
                .map(|l| l.unit_price * f64::from(l.quantity))
                .sum();
            assert_eq!(cart.total(), expected);
        }
    }
}
