//! Ring buffer backed by a doubly-mapped virtual memory region.
//!
//! The buffer's physical storage is an anonymous shared memory object mapped
//! twice, back to back, into one reserved virtual range. Any contiguous run
//! of buffered items can therefore be addressed as a single flat slice, even
//! when it straddles the physical wrap point — no copy-in-two-halves logic
//! anywhere, and [`RingBuffer::peek`] can hand out one borrow covering all
//! unread data.
//!
//! ```text
//!  virtual:  [ mapping #1 (R bytes) ][ mapping #2 (R bytes) ]
//!                     └──────── same physical pages ────────┘
//! ```
//!
//! The requested capacity is rounded up to the OS allocation granularity, so
//! [`RingBuffer::buf_len`] usually reports more slots than were asked for.
//! One slot is reserved to distinguish a full buffer from an empty one.
//!
//! All operations take `&self` and synchronise on one internal mutex, which
//! makes the buffer a drop-in single-producer/single-consumer channel for
//! `Copy` sample types.

use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Read/write cursors into the mapped region, both in `0..buf_len`.
struct Cursors {
    r: usize,
    w: usize,
}

/// Dual-mapped single-producer/single-consumer ring buffer of `Copy` items.
pub struct RingBuffer<T: Copy> {
    /// Start of the 2·R-byte double mapping.
    base: *mut u8,
    /// Size in bytes of one copy of the region.
    region_len: usize,
    /// Total item slots in the region (one is kept reserved).
    buf_len: usize,
    /// When set, `write` evicts the oldest items instead of truncating.
    overwrite: bool,
    state: Mutex<Cursors>,
    _marker: PhantomData<T>,
}

// The raw mapping is only touched under the internal mutex.
unsafe impl<T: Copy + Send> Send for RingBuffer<T> {}
unsafe impl<T: Copy + Send> Sync for RingBuffer<T> {}

impl<T: Copy> RingBuffer<T> {
    /// Allocate a ring holding at least `capacity` items.
    ///
    /// Fails with [`Error::ResourceExhausted`] if the OS refuses the shared
    /// object, the address-space reservation, or either mapping.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_mode(capacity, false)
    }

    /// Allocate a ring holding at least `capacity` items; in overwrite mode
    /// the writer evicts the oldest data instead of truncating its input.
    pub fn with_mode(capacity: usize, overwrite: bool) -> Result<Self> {
        let item_size = mem::size_of::<T>();
        assert!(item_size > 0, "zero-sized items are not supported");
        assert!(capacity > 0, "capacity must be greater than 0");

        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page <= 0 {
            return Err(Error::resource("sysconf(_SC_PAGESIZE) failed"));
        }
        let page = page as usize;
        assert!(
            page % item_size == 0,
            "item size must divide the page size for the flat view to hold"
        );

        let bytes = capacity
            .checked_mul(item_size)
            .ok_or_else(|| Error::resource("ring capacity overflows"))?;
        let region_len = bytes.div_ceil(page) * page;

        let fd = create_shared_fd()?;

        // SAFETY: standard double-mapping sequence. Reserve 2·R bytes of
        // address space, then map the shared object at offset 0 and again at
        // offset R with MAP_FIXED inside the reservation.
        unsafe {
            if libc::ftruncate(fd, region_len as libc::off_t) != 0 {
                libc::close(fd);
                return Err(Error::resource(format!(
                    "ftruncate to {region_len} bytes failed"
                )));
            }

            let reservation = libc::mmap(
                ptr::null_mut(),
                2 * region_len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if reservation == libc::MAP_FAILED {
                libc::close(fd);
                return Err(Error::resource(format!(
                    "cannot reserve {} bytes of address space",
                    2 * region_len
                )));
            }

            let base = reservation as *mut u8;
            for half in 0..2 {
                let at = base.add(half * region_len);
                let mapped = libc::mmap(
                    at as *mut libc::c_void,
                    region_len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    fd,
                    0,
                );
                if mapped == libc::MAP_FAILED || mapped != at as *mut libc::c_void {
                    libc::munmap(reservation, 2 * region_len);
                    libc::close(fd);
                    return Err(Error::resource("mapping the shared region failed"));
                }
            }

            // Both mappings keep the object alive.
            libc::close(fd);

            Ok(Self {
                base,
                region_len,
                buf_len: region_len / item_size,
                overwrite,
                state: Mutex::new(Cursors { r: 0, w: 0 }),
                _marker: PhantomData,
            })
        }
    }

    /// Total item slots in the mapped region.
    pub fn buf_len(&self) -> usize {
        self.buf_len
    }

    /// Usable capacity in items (one slot stays reserved).
    pub fn capacity(&self) -> usize {
        self.buf_len - 1
    }

    /// Items currently buffered.
    pub fn data_available(&self) -> usize {
        let state = self.state.lock().unwrap();
        self.available(&state)
    }

    /// Items that can be written without evicting or truncating.
    pub fn space_available(&self) -> usize {
        let state = self.state.lock().unwrap();
        self.buf_len - 1 - self.available(&state)
    }

    /// Copy items from `src` into the ring.
    ///
    /// Returns the number of items accepted: `min(src.len(), space)` in
    /// normal mode, always `src.len()` in overwrite mode (the read cursor is
    /// advanced past evicted items).
    pub fn write(&self, src: &[T]) -> usize {
        let mut state = self.state.lock().unwrap();
        let space = self.buf_len - 1 - self.available(&state);

        if self.overwrite {
            // Only the newest capacity() items can survive anyway.
            let keep = src.len().min(self.buf_len - 1);
            let evict = keep.saturating_sub(space);
            state.r = (state.r + evict) % self.buf_len;

            let w = state.w;
            unsafe { self.copy_in(&src[src.len() - keep..], w) };
            state.w = (w + keep) % self.buf_len;
            return src.len();
        }

        let n = src.len().min(space);
        let w = state.w;
        unsafe { self.copy_in(&src[..n], w) };
        state.w = (w + n) % self.buf_len;
        n
    }

    /// Copy up to `dst.len()` items out of the ring, advancing the read
    /// cursor. Returns the number of items copied.
    pub fn read(&self, dst: &mut [T]) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = dst.len().min(self.available(&state));
        let r = state.r;
        // SAFETY: r + n stays inside the double mapping (n < buf_len).
        unsafe {
            ptr::copy_nonoverlapping(self.slot(r) as *const T, dst.as_mut_ptr(), n);
        }
        state.r = (r + n) % self.buf_len;
        n
    }

    /// Borrow all unread data as one flat slice.
    ///
    /// Thanks to the double mapping the view always covers the full
    /// `data_available()`, wrap or no wrap. The writer is held off for the
    /// lifetime of the returned view.
    pub fn peek(&self) -> RingView<'_, T> {
        let state = self.state.lock().unwrap();
        let len = self.available(&state);
        let ptr = self.slot(state.r) as *const T;
        RingView {
            ptr,
            len,
            _guard: state,
        }
    }

    /// Drop up to `n` items without copying them. Returns the number
    /// discarded.
    pub fn purge(&self, n: usize) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = n.min(self.available(&state));
        state.r = (state.r + n) % self.buf_len;
        n
    }

    /// Discard everything currently buffered.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.r = state.w;
    }

    fn available(&self, state: &Cursors) -> usize {
        (state.w + self.buf_len - state.r) % self.buf_len
    }

    fn slot(&self, index: usize) -> *mut T {
        debug_assert!(index < self.buf_len);
        // SAFETY: index < buf_len, and the double mapping extends to
        // 2 · buf_len slots, so windows of up to buf_len items are in range.
        unsafe { (self.base as *mut T).add(index) }
    }

    /// Copy `src` to the slots starting at `index`.
    ///
    /// Caller must hold the state lock and guarantee `src.len() < buf_len`.
    unsafe fn copy_in(&self, src: &[T], index: usize) {
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.slot(index), src.len());
        }
    }
}

impl<T: Copy> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: base/region_len describe the mapping made in with_mode.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, 2 * self.region_len);
        }
    }
}

/// Flat view over all unread items, returned by [`RingBuffer::peek`].
///
/// Holds the ring's internal lock; drop the view before writing from the
/// same thread.
pub struct RingView<'a, T: Copy> {
    ptr: *const T,
    len: usize,
    _guard: MutexGuard<'a, Cursors>,
}

impl<T: Copy> Deref for RingView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: ptr/len describe initialised slots inside the double
        // mapping, and the held lock keeps the writer out.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// Anonymous shared memory object for the double mapping.
#[cfg(target_os = "linux")]
fn create_shared_fd() -> Result<libc::c_int> {
    let fd = unsafe { libc::memfd_create(c"gsmcal-ring".as_ptr(), 0) };
    if fd < 0 {
        return Err(Error::resource("memfd_create failed"));
    }
    Ok(fd)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn create_shared_fd() -> Result<libc::c_int> {
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SEQ: AtomicUsize = AtomicUsize::new(0);

    let name = format!(
        "/gsmcal-ring-{}-{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let cname = CString::new(name).expect("shm name contains no NUL");
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            0o600,
        )
    };
    if fd < 0 {
        return Err(Error::resource("shm_open failed"));
    }
    // The mappings keep the object alive; remove the name right away.
    unsafe { libc::shm_unlink(cname.as_ptr()) };
    Ok(fd)
}
