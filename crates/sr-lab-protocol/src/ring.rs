/// Fixed-size slot buffer indexed by window offset.
///
/// Slot 0 always belongs to the window base. Sliding the window by `n`
/// shifts every entry `n` slots toward the front and frees the tail.
#[derive(Debug, Clone)]
pub struct SlotRing<T> {
    slots: Vec<Option<T>>,
}

impl<T> SlotRing<T> {
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn insert(&mut self, index: usize, value: T) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Number of consecutive occupied slots from the front whose entry satisfies `pred`.
    pub fn leading_run(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.slots
            .iter()
            .take_while(|slot| matches!(slot, Some(value) if pred(value)))
            .count()
    }

    /// Drop the first `n` entries and move the rest to the front.
    pub fn shift(&mut self, n: usize) {
        let n = n.min(self.slots.len());
        self.slots.rotate_left(n);
        let len = self.slots.len();
        for slot in &mut self.slots[len - n..] {
            *slot = None;
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
