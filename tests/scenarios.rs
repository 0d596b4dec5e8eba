//! End-to-end scenarios exercising each component against a concrete,
//! fully-worked example rather than an encode/decode round trip.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use osi_core::event::Event;
use osi_core::fifo::Fifo;
use osi_core::flash::{descriptor, init, wp, MockPort};
use osi_core::notify::Notification;
use osi_core::pipe::Pipe;
use osi_core::sync::Semaphore;
use osi_core::thread::ThreadBuilder;
use osi_core::workqueue::{WorkItem, WorkQueue};

#[test]
fn pipe_drain_and_eof() {
    let p = Pipe::new(16);
    assert_eq!(p.write(&(0u8..10).collect::<Vec<u8>>()), 10);

    let mut first = [0u8; 6];
    assert_eq!(p.read(&mut first), 6);
    assert_eq!(first, [0, 1, 2, 3, 4, 5]);

    p.set_eof();

    let mut second = [0u8; 6];
    assert_eq!(p.read(&mut second), 4);
    assert_eq!(&second[..4], &[6, 7, 8, 9]);

    let mut third = [0u8; 1];
    assert_eq!(p.read(&mut third), -1);
}

#[test]
fn pipe_wrap_preserves_byte_identity() {
    let p = Pipe::new(8);
    let first_batch: Vec<u8> = (0..6).collect();
    assert_eq!(p.write(&first_batch), 6);
    let mut drained = [0u8; 6];
    assert_eq!(p.read(&mut drained), 6);
    assert_eq!(&drained[..], &first_batch[..]);

    // This write straddles the ring's wrap point.
    let second_batch: Vec<u8> = (100..106).collect();
    assert_eq!(p.write(&second_batch), 6);
    let mut out = [0u8; 6];
    assert_eq!(p.read(&mut out), 6);
    assert_eq!(&out[..], &second_batch[..]);
}

#[test]
fn fifo_search_splits_on_first_newline() {
    let mut f = Fifo::new(32);
    f.put(b"AB\nCD\nE");
    let skipped = f.search(b'\n', false).unwrap();
    assert_eq!(skipped, 2); // position of the match; rd itself advances past "AB\n"

    let mut out = [0u8; 2];
    assert_eq!(f.get(&mut out), 2);
    assert_eq!(&out, b"CD");
}

#[test]
fn work_queue_runs_items_in_order_with_immediate_wait_finish() {
    let wq = WorkQueue::new("scenario-order", 32, 64 * 1024);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut items = Vec::new();
    for i in 1..=3u8 {
        let order_cb = Arc::clone(&order);
        let item = WorkItem::new(i as usize, move |ctx| {
            order_cb.lock().unwrap().push(ctx);
        });
        wq.enqueue(&item);
        items.push(item);
    }

    for item in &items {
        assert!(wq.wait_finish(item, 1000));
    }
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);

    // The third item already finished; a further wait_finish call returns
    // immediately without blocking on work still in flight.
    assert!(wq.wait_finish(&items[2], 0));
    wq.delete();
}

#[test]
fn notification_coalesces_ten_triggers_then_fires_again_after_reset() {
    let gate = Arc::new(Semaphore::new("scenario-gate", 0, 1).unwrap());
    let gate_thread = Arc::clone(&gate);
    let handle = ThreadBuilder::new("scenario-notify-target")
        .mailbox_capacity(16)
        .spawn(move |ctx| {
            gate_thread.acquire();
            // First wait dispatches the coalesced trigger; the second
            // dispatches the post-callback re-trigger.
            ctx.wait();
            ctx.wait();
            0
        })
        .unwrap();

    let fired = Arc::new(AtomicU32::new(0));
    let fired_cb = Arc::clone(&fired);
    let n = Notification::new(
        &handle,
        move |_ctx| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        },
        0,
    );

    for _ in 0..10 {
        n.trigger();
    }
    gate.release();

    // Give the first dispatch a moment, then trigger once more, per the
    // scenario, a trigger after the callback has run fires it again.
    std::thread::sleep(std::time::Duration::from_millis(30));
    n.trigger();

    handle.join().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn flash_wp_mapping_gd_8mib() {
    let d = descriptor::lookup([0xC8, 0x40, 0x17]).unwrap();
    assert_eq!(d.capacity, 8 * 1024 * 1024);

    let whole_chip = wp::wp_range(&d, 0, 1);
    assert_eq!(whole_chip.start, 0);
    assert_eq!(whole_chip.end, 8 * 1024 * 1024);

    let units = d.capacity / wp::UNIT_BYTES;
    let past_quarter = wp::wp_range(&d, 4 * 1024 * 1024 + 1, 1);
    assert_eq!(past_quarter.start, (units * 3 / 4) * wp::UNIT_BYTES);
    assert_eq!(past_quarter.end, d.capacity);
}

#[test]
fn flash_init_falls_back_on_mismatched_id() {
    // Only 0xC8 0x40 0x17 is in the table; 0x18 as the capacity byte binds
    // via the 16-bit mfg+memtype fallback with capacity overridden.
    let mut port = MockPort::new([0xC8, 0x40, 0x18], 4096);
    let d = init::init(&mut port);
    assert_eq!(d.flash_type, descriptor::FlashType::Gd);
    assert_eq!(d.capacity, 1 << 0x18);
}

#[test]
#[should_panic]
fn flash_init_panics_on_unknown_vendor() {
    let mut port = MockPort::new([0xAA, 0xBB, 0xCC], 4096);
    init::init(&mut port);
}

#[test]
fn callback_posted_across_threads_runs_on_target() {
    static RAN: AtomicU32 = AtomicU32::new(0);
    fn bump(_ctx: usize) {
        RAN.fetch_add(1, Ordering::SeqCst);
    }

    let handle = ThreadBuilder::new("scenario-callback-target")
        .mailbox_capacity(4)
        .spawn(|ctx| {
            ctx.wait();
            0
        })
        .unwrap();

    handle
        .send_event(Event::Callback {
            func: bump,
            ctx: 0,
        })
        .unwrap();
    handle.join().unwrap();
    assert_eq!(RAN.load(Ordering::SeqCst), 1);
}
