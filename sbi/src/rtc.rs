//! Goldfish real-time clock. Grounded in `original_source/sbi/src/rtc.c`:
//! two 32-bit halves of a nanosecond counter, combined into one 64-bit
//! value. The first read wakes the device; its value isn't meaningful.

const BASE: usize = 0x0010_1000;
const TIME_LOW: usize = 0x00;
const TIME_HI: usize = 0x04;

pub fn get_time() -> u64 {
    let low = unsafe { ((BASE + TIME_LOW) as *const u32).read_volatile() };
    let high = unsafe { ((BASE + TIME_HI) as *const u32).read_volatile() };
    ((high as u64) << 32) | low as u64
}

pub fn init() {
    let _ = get_time();
}
