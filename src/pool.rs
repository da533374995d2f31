use crate::{Construct, PoolError};
use alloc::{boxed::Box, fmt, vec, vec::Vec};
use core::{
    cell::UnsafeCell,
    convert::Infallible,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem::{self, MaybeUninit},
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
};
use log::trace;

/// Free-list bookkeeping of a [`Pool`].
struct SlotTable {
    /// Indices of slots without a live value, reused last-in first-out.
    free: Vec<usize>,
    /// `occupied[i]` is true iff `i` is not in `free`.
    occupied: Vec<bool>,
}

/// A fixed-capacity object pool for values of a single type.
///
/// The pool reserves storage for `capacity` values once, at construction, and
/// never grows or shrinks. [`Self::allocate`] moves a value into a free slot
/// and returns a [`Handle`] to it; [`Self::free`] consumes the handle, drops
/// the value and makes the slot available again. Values still alive when the
/// pool is dropped are dropped with it.
///
/// Slots keep their address for the pool's whole lifetime. The most recently
/// freed slot is the next one handed out, and a fresh pool hands out its slots
/// from the highest index down.
///
/// The pool is meant to be used from a single thread: it can be moved to
/// another thread when `T: Send`, but it is never `Sync`.
///
/// A pool cannot be copied:
///
/// ```compile_fail
/// let pool = fixpool::Pool::<u32>::new(2);
/// let copy: fixpool::Pool<u32> = pool.clone();
/// ```
pub struct Pool<T> {
    base: NonNull<MaybeUninit<T>>,
    capacity: usize,
    slots: UnsafeCell<SlotTable>,
    // owns values of T and stays invariant over it since slots are written
    // through shared references
    _marker: PhantomData<UnsafeCell<T>>,
}

// Safety: the pool exclusively owns its storage and every value in it.
unsafe impl<T: Send> Send for Pool<T> {}

impl<T> Pool<T> {
    /// Creates a pool with room for `capacity` values.
    ///
    /// No value is constructed. A capacity of zero is allowed and yields a
    /// pool on which every allocation fails with [`PoolError::Exhausted`].
    ///
    /// # Panics
    ///
    /// Panics if the storage size overflows `isize::MAX` bytes, like
    /// [`Vec::with_capacity`].
    pub fn new(capacity: usize) -> Self {
        let mut storage = Vec::<MaybeUninit<T>>::with_capacity(capacity);
        // Safety: MaybeUninit<T> does not require initialization.
        unsafe { storage.set_len(capacity) };
        let base = NonNull::from(Box::leak(storage.into_boxed_slice())).cast::<MaybeUninit<T>>();
        trace!(
            "created pool with {} slots of {} bytes",
            capacity,
            mem::size_of::<T>()
        );
        Pool {
            base,
            capacity,
            slots: UnsafeCell::new(SlotTable {
                free: (0..capacity).collect(),
                occupied: vec![false; capacity],
            }),
            _marker: PhantomData,
        }
    }

    /// Borrows the slot table.
    /// Safety: no reference returned by `slots_mut` may be alive, which holds
    /// because neither is kept across calls into element code.
    fn slots(&self) -> &SlotTable {
        unsafe { &*self.slots.get() }
    }

    /// Get the slot table as mutable reference
    /// Safety: see `slots`; the pool is not `Sync`.
    #[allow(clippy::mut_from_ref)]
    fn slots_mut(&self) -> &mut SlotTable {
        unsafe { &mut *self.slots.get() }
    }

    fn slot_ptr(&self, index: usize) -> NonNull<T> {
        debug_assert!(index < self.capacity);
        // Safety: index is within the storage reserved in `new`.
        unsafe { self.base.add(index) }.cast::<T>()
    }

    /// Derives a slot index from an address using the storage base and the
    /// element stride.
    ///
    /// Returns `None` for addresses outside the storage, addresses not on a
    /// slot boundary, and for every address when `T` is zero-sized.
    fn slot_of(&self, ptr: *const T) -> Option<usize> {
        let stride = mem::size_of::<T>();
        if stride == 0 {
            return None;
        }
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        if offset % stride != 0 {
            return None;
        }
        let index = offset / stride;
        (index < self.capacity).then_some(index)
    }

    /// Finds the occupied slot a handle points into, if the handle belongs to
    /// this pool.
    fn locate(&self, handle: &Handle<'_, T>) -> Option<usize> {
        if !ptr::eq(handle.pool, self) {
            return None;
        }
        let index = if mem::size_of::<T>() == 0 {
            Some(handle.index).filter(|&index| index < self.capacity)
        } else {
            self.slot_of(handle.ptr.as_ptr())
        };
        index.filter(|&index| self.slots().occupied[index])
    }

    /// Moves `value` into a free slot.
    ///
    /// If the pool is exhausted, `value` is dropped and
    /// [`PoolError::Exhausted`] is returned. Use [`Self::allocate_with`] to
    /// build the value only when a slot is available.
    pub fn allocate(&self, value: T) -> Result<Handle<'_, T>, PoolError> {
        self.emplace(|| Ok::<T, Infallible>(value))
    }

    /// Builds a value with `f` and moves it into a free slot.
    ///
    /// `f` is not called when the pool is exhausted. If `f` panics, the pool
    /// is left exactly as it was.
    pub fn allocate_with<F>(&self, f: F) -> Result<Handle<'_, T>, PoolError>
    where
        F: FnOnce() -> T,
    {
        self.emplace(|| Ok::<T, Infallible>(f()))
    }

    /// Builds a value with a fallible constructor and moves it into a free
    /// slot.
    ///
    /// The constructor runs at most once, and only after a free slot has been
    /// confirmed. If it fails, its error is returned unchanged inside
    /// [`PoolError::ConstructionFailed`] and no slot changes state.
    ///
    /// The constructor may itself allocate from this pool. If doing so takes
    /// the last free slot, the constructed value is dropped and
    /// [`PoolError::Exhausted`] is returned.
    pub fn emplace<C>(&self, ctor: C) -> Result<Handle<'_, T>, PoolError<C::Error>>
    where
        C: Construct<T>,
    {
        if self.slots().free.is_empty() {
            return Err(PoolError::Exhausted {
                capacity: self.capacity,
            });
        }
        let value = ctor.construct().map_err(PoolError::ConstructionFailed)?;
        let Some(index) = self.slots_mut().free.pop() else {
            return Err(PoolError::Exhausted {
                capacity: self.capacity,
            });
        };
        let ptr = self.slot_ptr(index);
        // Safety: the slot was on the free list, so it holds no live value and
        // no handle points into it.
        unsafe { ptr.as_ptr().write(value) };
        self.slots_mut().occupied[index] = true;
        Ok(Handle {
            ptr,
            index,
            pool: self,
        })
    }

    /// Drops the value behind `handle` and returns its slot to the pool.
    ///
    /// The freed slot is the next one [`Self::allocate`] hands out. Fails
    /// with [`PoolError::ForeignObject`] without touching the pool when the
    /// handle was issued by another pool; the value then stays alive in the
    /// pool that owns it until that pool is dropped.
    pub fn free(&self, handle: Handle<'_, T>) -> Result<(), PoolError> {
        let index = self.locate(&handle).ok_or(PoolError::ForeignObject)?;
        // Safety: the slot is occupied and `handle`, its only accessor, is
        // consumed here.
        let value = unsafe { handle.ptr.as_ptr().read() };
        let slots = self.slots_mut();
        slots.occupied[index] = false;
        slots.free.push(index);
        // Bookkeeping is done before running element code.
        drop(value);
        Ok(())
    }

    /// Returns `true` if `value` lives in one of this pool's occupied slots.
    ///
    /// The slot is derived from the address alone, so this is always `false`
    /// for zero-sized types.
    pub fn owns(&self, value: &T) -> bool {
        self.slot_of(value)
            .is_some_and(|index| self.slots().occupied[index])
    }

    /// Gets the number of slots in the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Gets the number of live values in the pool.
    pub fn len(&self) -> usize {
        self.capacity - self.available()
    }

    /// Gets the number of free slots.
    pub fn available(&self) -> usize {
        self.slots().free.len()
    }

    /// Checks if the pool holds no live values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if every slot holds a live value, so the next allocation
    /// fails.
    pub fn is_full(&self) -> bool {
        self.available() == 0
    }
}

impl<T> Default for Pool<T> {
    /// Creates an empty pool with zero capacity.
    fn default() -> Self {
        Pool::new(0)
    }
}

/// Drops every live value, then releases the storage.
impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        let base = self.base;
        let slots = self.slots.get_mut();
        trace!(
            "dropping pool with {} live values out of {} slots",
            self.capacity - slots.free.len(),
            self.capacity
        );
        if mem::needs_drop::<T>() {
            for (index, occupied) in slots.occupied.iter_mut().enumerate() {
                if mem::replace(occupied, false) {
                    // Safety: occupied slots hold a live value and no handle
                    // can outlive the pool.
                    unsafe { ptr::drop_in_place(base.as_ptr().add(index).cast::<T>()) };
                }
            }
        }
        let storage = ptr::slice_from_raw_parts_mut(base.as_ptr(), self.capacity);
        // Safety: `base` and `capacity` describe the boxed slice leaked in `new`.
        drop(unsafe { Box::from_raw(storage) });
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// A handle to a live value in a [`Pool`].
///
/// Each handle is the only way to reach its value. Pass it to [`Pool::free`]
/// to drop the value and release the slot. Dropping the handle itself does
/// not release anything: the value then stays in the pool until the pool is
/// dropped.
#[must_use = "dropping a handle keeps its slot occupied until the pool is dropped"]
pub struct Handle<'a, T> {
    ptr: NonNull<T>,
    index: usize,
    pool: &'a Pool<T>,
}

impl<'a, T> Handle<'a, T> {
    /// Gets the index of the slot holding the value.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Consumes the handle and returns a reference to the value that lives
    /// as long as the pool borrow.
    ///
    /// The slot can no longer be freed; the value is dropped with the pool.
    pub fn into_mut(self) -> &'a mut T {
        // Safety: the handle was the only accessor of the slot and the pool
        // outlives 'a.
        unsafe { &mut *self.ptr.as_ptr() }
    }
}

impl<'a, T> Deref for Handle<'a, T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl<'a, T> DerefMut for Handle<'a, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.ptr.as_mut() }
    }
}

impl<'a, T: Hash> Hash for Handle<'a, T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state);
    }
}
impl<'a, T: fmt::Display> fmt::Display for Handle<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}
impl<'a, T: fmt::Debug> fmt::Debug for Handle<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
impl<'a, T> fmt::Pointer for Handle<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&(&**self as *const T), f)
    }
}
impl<'a, T: PartialEq> PartialEq for Handle<'a, T> {
    #[inline]
    fn eq(&self, other: &Handle<'a, T>) -> bool {
        self.deref().eq(other)
    }
}
impl<'a, T: Eq> Eq for Handle<'a, T> {}
impl<'a, T: PartialOrd> PartialOrd for Handle<'a, T> {
    #[inline]
    fn partial_cmp(&self, other: &Handle<'a, T>) -> Option<core::cmp::Ordering> {
        (**self).partial_cmp(&**other)
    }
}
impl<'a, T: Ord> Ord for Handle<'a, T> {
    #[inline]
    fn cmp(&self, other: &Handle<'a, T>) -> core::cmp::Ordering {
        (**self).cmp(&**other)
    }
}
impl<'a, T> core::borrow::Borrow<T> for Handle<'a, T> {
    #[inline(always)]
    fn borrow(&self) -> &T {
        self
    }
}
impl<'a, T> core::borrow::BorrowMut<T> for Handle<'a, T> {
    #[inline(always)]
    fn borrow_mut(&mut self) -> &mut T {
        self
    }
}
impl<'a, T> AsRef<T> for Handle<'a, T> {
    #[inline(always)]
    fn as_ref(&self) -> &T {
        self
    }
}
impl<'a, T> AsMut<T> for Handle<'a, T> {
    #[inline(always)]
    fn as_mut(&mut self) -> &mut T {
        self
    }
}
