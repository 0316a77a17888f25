//! Firmware console output. Grounded in the teacher's `kernel::print`
//! (`core::fmt::Write` over the UART), trimmed to what the firmware itself
//! needs: it has no hart-local clock cheap enough to stamp every line with,
//! so there is no `info!`/`warn!` timestamp prefix here, just the raw line.

use core::fmt;

pub static PRINT_LOCK: spin::Mutex<()> = spin::Mutex::new(());

struct UartWriter;

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            crate::uart::put(byte);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _lock = PRINT_LOCK.lock();
    let _ = UartWriter.write_fmt(args);
}

#[macro_export]
macro_rules! uart_print {
    ($($args:tt)+) => ({
        $crate::print::_print(format_args!($($args)+));
    });
}

#[macro_export]
macro_rules! uart_println {
    () => ($crate::uart_print!("\r\n"));
    ($fmt:expr) => ($crate::uart_print!(concat!($fmt, "\r\n")));
    ($fmt:expr, $($args:tt)+) => ($crate::uart_print!(concat!($fmt, "\r\n"), $($args)+));
}
