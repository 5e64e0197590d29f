use std::cmp::min;
use std::ops::Index;

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
    occupied: bool,
}

/// Hash-consing table with separate chaining.
///
/// Values live in a dense vector and are never moved, so an index stays valid until the
/// value is dropped by [`retain`][Table::retain]. Dropped cells go to a free list and are
/// reused by later insertions. Cell `0` is a sentinel: a bucket or `next` link equal to `0`
/// means "empty". The bucket array doubles once the load factor exceeds one entry per
/// bucket.
pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<usize>,
    bitmask: u64,
    /// Dropped cells, reused before the vector grows.
    free: Vec<usize>,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");

        let capacity = 1 << bits;
        let mut data = Vec::with_capacity(capacity);
        data.push(Entry {
            value: T::default(),
            next: 0,
            occupied: true,
        });

        let buckets_size = 1 << min(bits, 24);

        Self {
            data,
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
            free: Vec::new(),
        }
    }
}

impl<T> Table<T> {
    /// Get the number of stored values (not counting the sentinel).
    pub fn size(&self) -> usize {
        self.data.len() - 1 - self.free.len()
    }
    /// Get the number of allocated cells, free ones included.
    pub fn capacity(&self) -> usize {
        self.data.len() - 1
    }
    /// Get the number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Check if the cell at the given index holds a value.
    pub fn is_occupied(&self, index: usize) -> bool {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].occupied
    }

    /// Get the index of the next cell in the same bucket.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }

    /// Add a new value without hashing it and return its index.
    pub fn add(&mut self, value: T) -> usize {
        let entry = Entry {
            value,
            next: 0,
            occupied: true,
        };
        match self.free.pop() {
            Some(index) => {
                self.data[index] = entry;
                index
            }
            None => {
                self.data.push(entry);
                self.data.len() - 1
            }
        }
    }

    /// Drop every value in the buckets whose index does not satisfy `keep`.
    ///
    /// Returns the number of dropped values. Their indices are reused by later insertions.
    pub fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) -> usize {
        let mut dropped = 0;
        for b in 0..self.buckets.len() {
            let mut index = self.buckets[b];
            let mut head = 0;
            let mut last = 0;
            while index != 0 {
                let next = self.data[index].next;
                if keep(index) {
                    if last == 0 {
                        head = index;
                    } else {
                        self.data[last].next = index;
                    }
                    last = index;
                } else {
                    self.data[index].occupied = false;
                    self.data[index].next = 0;
                    self.free.push(index);
                    dropped += 1;
                }
                index = next;
            }
            if last != 0 {
                self.data[last].next = 0;
            }
            self.buckets[b] = head;
        }
        log::debug!("Dropped {} value(s), {} left", dropped, self.size());
        dropped
    }
}

impl<T> Table<T>
where
    T: MyHash,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a value into the table and return its index.
    ///
    /// Returns the index of an equal value if one is already stored.
    pub fn put(&mut self, value: T) -> usize
    where
        T: Eq,
    {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        while index != 0 {
            if &value == self.value(index) {
                return index;
            }
            index = self.next(index);
        }

        // Prepend to the bucket chain.
        let i = self.add(value);
        self.data[i].next = self.buckets[bucket_index];
        self.buckets[bucket_index] = i;

        if self.size() > self.buckets.len() && self.buckets.len() < (1 << 28) {
            self.rehash(self.buckets.len() * 2);
        }

        i
    }

    fn rehash(&mut self, buckets_size: usize) {
        log::debug!("Rehashing table: {} -> {} buckets", self.buckets.len(), buckets_size);
        self.buckets = vec![0; buckets_size];
        self.bitmask = (buckets_size - 1) as u64;
        for i in 1..self.data.len() {
            if !self.data[i].occupied {
                continue;
            }
            let b = self.bucket_index(&self.data[i].value);
            self.data[i].next = self.buckets[b];
            self.buckets[b] = i;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
