//! The TTY device: a single TCP/TELNET client session driving the core's
//! `push_char`-style data interface (§6 "TTY TELNET framing").
//!
//! A second concurrent connection attempt is rejected with a `BUSY` line
//! (§6); the accepted connection gets the initial `IAC WILL ECHO`, `IAC
//! WILL SUPPRESS-GO-AHEAD` greeting before anything else.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use ist66_core::{transfer as xfer, Device, InterruptController};

use crate::telnet::{greeting, TelnetFilter};

const BUSY_LINE: &[u8] = b"BUSY\r\n";

struct Shared {
    connection: Option<TcpStream>,
    rx: VecDeque<u8>,
}

/// A TTY allocated at a dynamically chosen TCP port (§6 "I/O device
/// numbering": "TTY allocated dynamically with TCP port argument").
pub struct Tty {
    shared: Arc<(Mutex<Shared>, Condvar)>,
    interrupts: Arc<InterruptController>,
    irq: u8,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
}

impl Tty {
    /// Bind a listener and start accepting connections in the background.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the port cannot be bound.
    pub fn new(port: u16, interrupts: Arc<InterruptController>, irq: u8) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        let shared = Arc::new((Mutex::new(Shared { connection: None, rx: VecDeque::new() }), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_shared = Arc::clone(&shared);
        let accept_interrupts = Arc::clone(&interrupts);
        let accept_shutdown = Arc::clone(&shutdown);
        let accept_handle = std::thread::spawn(move || {
            accept_loop(listener, accept_shared, accept_interrupts, irq, accept_shutdown);
        });

        Ok(Self { shared, interrupts, irq, shutdown, accept_handle: Some(accept_handle) })
    }
}

fn accept_loop(
    listener: TcpListener,
    shared: Arc<(Mutex<Shared>, Condvar)>,
    interrupts: Arc<InterruptController>,
    irq: u8,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => accept_connection(stream, &shared, &interrupts, irq, &shutdown),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => std::thread::sleep(Duration::from_millis(10)),
        }
    }
}

fn accept_connection(
    mut stream: TcpStream,
    shared: &Arc<(Mutex<Shared>, Condvar)>,
    interrupts: &Arc<InterruptController>,
    irq: u8,
    shutdown: &Arc<AtomicBool>,
) {
    let already_connected = {
        let (lock, _) = &**shared;
        lock.lock().unwrap().connection.is_some()
    };
    if already_connected {
        let _ = stream.write_all(BUSY_LINE);
        return;
    }

    let _ = stream.write_all(&greeting());
    let Ok(reader_stream) = stream.try_clone() else { return };
    {
        let (lock, _) = &**shared;
        lock.lock().unwrap().connection = Some(stream);
    }

    let reader_shared = Arc::clone(shared);
    let reader_interrupts = Arc::clone(interrupts);
    let reader_shutdown = Arc::clone(shutdown);
    std::thread::spawn(move || read_loop(reader_stream, reader_shared, reader_interrupts, irq, reader_shutdown));
}

fn read_loop(
    mut stream: TcpStream,
    shared: Arc<(Mutex<Shared>, Condvar)>,
    interrupts: Arc<InterruptController>,
    irq: u8,
    shutdown: Arc<AtomicBool>,
) {
    let mut filter = TelnetFilter::new();
    let mut byte = [0u8; 1];
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if let Some(data) = filter.feed(byte[0]) {
                    let (lock, cv) = &*shared;
                    lock.lock().unwrap().rx.push_back(data);
                    cv.notify_all();
                    interrupts.assert(irq);
                }
            }
        }
    }
    let (lock, _) = &*shared;
    lock.lock().unwrap().connection = None;
}

impl Device for Tty {
    fn op(&mut self, acc_in: u64, _ctl: u8, transfer: u8) -> u64 {
        let (lock, _cv) = &*self.shared;

        if transfer == xfer::STATUS {
            let st = lock.lock().unwrap();
            let busy = st.rx.is_empty();
            return (u64::from(!busy) << 1) | u64::from(busy);
        }
        if transfer <= xfer::MAX_INPUT && transfer % 2 == 0 {
            let mut st = lock.lock().unwrap();
            return u64::from(st.rx.pop_front().unwrap_or(0));
        }
        if transfer <= xfer::MAX_OUTPUT && transfer % 2 == 1 {
            let byte = (acc_in & 0xFF) as u8;
            let mut st = lock.lock().unwrap();
            if let Some(stream) = st.connection.as_mut() {
                let _ = stream.write_all(&[byte]);
            }
        }
        0
    }
}

impl Drop for Tty {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        let _ = self.irq;
        let _ = &self.interrupts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as ClientStream;

    fn bound_port(listener: &TcpListener) -> u16 {
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn greeting_is_sent_and_data_bytes_are_queued() {
        let probe = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = bound_port(&probe);
        drop(probe);

        let ic = Arc::new(InterruptController::new());
        ic.set_mask(0xFFFF);
        let mut tty = Tty::new(port, ic, 9).unwrap();

        let mut client = loop {
            if let Ok(c) = ClientStream::connect(("127.0.0.1", port)) {
                break c;
            }
            std::thread::sleep(Duration::from_millis(5));
        };

        let mut greet = [0u8; 6];
        client.read_exact(&mut greet).unwrap();
        assert_eq!(greet, greeting());

        client.write_all(b"hi").unwrap();
        let mut spins = 0;
        loop {
            let status = tty.op(0, 0, xfer::STATUS);
            if status & 0b10 != 0 {
                break;
            }
            spins += 1;
            assert!(spins < 5000, "no data arrived");
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(tty.op(0, 0, 0), b'h' as u64);
        assert_eq!(tty.op(0, 0, 0), b'i' as u64);
    }
}
