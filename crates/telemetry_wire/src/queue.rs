//! Fila circular de ciphertexts que falharam no envio.
//!
//! Capacidade fixa; quando cheia, o `push` descarta a entrada mais antiga
//! (perda limitada, nunca falha nem cresce). As entradas são cópias exatas do
//! que teria sido enviado; nada é recifrado.
//!
//! A fila pertence a um único ciclo de envio e é mutada via `&mut self`.
//! Compartilhá-la entre threads exige envolver em `Mutex`.

/// Capacidade padrão (entradas).
pub const DEFAULT_CAPACITY: usize = 1024;

/// Buffer circular com cursores de leitura e escrita.
///
/// `write == read` significa fila vazia, então o anel tem `capacity + 1`
/// posições para guardar `capacity` entradas.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    slots: Vec<Vec<u8>>,
    write: usize,
    read: usize,
}

impl RetryQueue {
    /// Capacidade mínima de 1 entrada.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Vec::new(); capacity.max(1) + 1],
            write: 0,
            read: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        (self.write + self.slots.len() - self.read) % self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write == self.read
    }

    /// Copia o blob para o fim da fila. Retorna `true` se a entrada mais
    /// antiga foi descartada para abrir espaço.
    pub fn push(&mut self, blob: &[u8]) -> bool {
        let slot = &mut self.slots[self.write];
        slot.clear();
        slot.extend_from_slice(blob);

        self.write = self.next(self.write);
        if self.write == self.read {
            self.read = self.next(self.read);
            true
        } else {
            false
        }
    }

    /// Entrada mais antiga ainda não consumida.
    pub fn peek(&self) -> Option<&[u8]> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.read])
        }
    }

    /// Consome a entrada mais antiga; sem efeito na fila vazia.
    pub fn pop(&mut self) {
        if !self.is_empty() {
            self.read = self.next(self.read);
        }
    }

    fn next(&self, cursor: usize) -> usize {
        (cursor + 1) % self.slots.len()
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(n: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[..4].copy_from_slice(&n.to_le_bytes());
        bytes
    }

    fn drain(queue: &mut RetryQueue) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(entry) = queue.peek() {
            out.push(entry.to_vec());
            queue.pop();
        }
        out
    }

    #[test]
    fn new_queue_is_empty() {
        let queue = RetryQueue::new(8);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.peek(), None);
        assert_eq!(queue.capacity(), 8);
    }

    #[test]
    fn fifo_order() {
        let mut queue = RetryQueue::new(8);
        for n in 0..5 {
            assert!(!queue.push(&blob(n)));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(drain(&mut queue), (0..5).map(blob).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = RetryQueue::new(4);
        queue.push(&blob(1));
        assert_eq!(queue.peek(), Some(&blob(1)[..]));
        assert_eq!(queue.peek(), Some(&blob(1)[..]));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_on_empty_is_noop() {
        let mut queue = RetryQueue::new(4);
        queue.pop();
        assert!(queue.is_empty());
        queue.push(&blob(1));
        queue.pop();
        queue.pop();
        assert!(queue.is_empty());
        assert_eq!(queue.peek(), None);
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let mut queue = RetryQueue::new(4);
        let mut evictions = 0;
        for n in 0..7 {
            if queue.push(&blob(n)) {
                evictions += 1;
            }
        }
        assert_eq!(evictions, 3);
        assert_eq!(queue.len(), 4);
        assert_eq!(drain(&mut queue), (3..7).map(blob).collect::<Vec<_>>());
    }

    #[test]
    fn push_1025_into_1024() {
        let mut queue = RetryQueue::default();
        for n in 0..1025 {
            queue.push(&blob(n));
        }
        assert_eq!(queue.len(), 1024);
        assert_eq!(queue.peek(), Some(&blob(1)[..]));

        let drained = drain(&mut queue);
        assert_eq!(drained.len(), 1024);
        assert!(!drained.contains(&blob(0)));
        assert_eq!(drained.last(), Some(&blob(1024)));
    }

    #[test]
    fn empty_again_after_full_drain_and_wraparound() {
        let mut queue = RetryQueue::new(3);
        for round in 0..5u32 {
            queue.push(&blob(round * 10));
            queue.push(&blob(round * 10 + 1));
            assert!(!queue.is_empty());
            assert_eq!(drain(&mut queue).len(), 2);
            assert!(queue.is_empty());
            assert_eq!(queue.peek(), None);
        }
    }

    #[test]
    fn entries_are_byte_identical_copies() {
        let mut queue = RetryQueue::new(2);
        let mut original = vec![0xAB; 48];
        queue.push(&original);
        original[0] = 0;
        assert_eq!(queue.peek(), Some(&[0xABu8; 48][..]));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut queue = RetryQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(&blob(1));
        assert!(queue.push(&blob(2)));
        assert_eq!(drain(&mut queue), vec![blob(2)]);
    }
}
