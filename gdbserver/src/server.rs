//! TCP accept loop and per-connection session driver.

use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use avrsim_arch::CoreOps;
use log::{info, warn};

use crate::codec::{self, Codec, Event};
use crate::dispatcher::{Action, Dispatcher};

/// Server-wide configuration.
pub struct ServerConfig {
    pub port: u16,
    /// When set, every packet exchanged is logged at debug level.
    pub trace: bool,
}

/// Installs a `Ctrl-C` handler and returns the flag it sets. Consulted by
/// the run loop between instructions during `c`/`s`.
pub fn install_cancel_handler() -> io::Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).map_err(io::Error::other)?;
    Ok(cancel)
}

/// Listens on `config.port`, serving one GDB session at a time. The core is
/// reset between sessions but the server itself keeps accepting
/// connections until `cancel` is set or the listener errors.
pub fn serve(
    core: &mut impl CoreOps,
    config: &ServerConfig,
    cancel: &Arc<AtomicBool>,
) -> io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", config.port))?;
    info!("gdb server listening on port {}", config.port);

    loop {
        let (stream, peer) = listener.accept()?;
        stream.set_nodelay(true)?;
        info!("gdb client connected from {peer}");
        core.reset();
        match session(core, stream, config, cancel) {
            Ok(()) => info!("gdb client {peer} disconnected"),
            Err(e) => warn!("gdb session with {peer} ended: {e}"),
        }
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }
    }
}

fn session(
    core: &mut impl CoreOps,
    mut stream: TcpStream,
    config: &ServerConfig,
    cancel: &Arc<AtomicBool>,
) -> io::Result<()> {
    let mut codec = Codec::new();
    let mut dispatcher = Dispatcher::default();

    loop {
        let event = codec::read_event(&mut stream)?;
        match event {
            Event::Ack => continue,
            Event::Nak => codec.resend(&mut stream)?,
            Event::Break => {
                stream.write_all(b"+")?;
                codec.send(&mut stream, b"S02")?;
            }
            Event::Packet(packet) => {
                if config.trace {
                    log::debug!("<- {}", String::from_utf8_lossy(&packet));
                }
                stream.write_all(b"+")?;
                match dispatcher.dispatch(core, &packet) {
                    Action::Reply(reply) => codec.send(&mut stream, &reply)?,
                    Action::Close(reply) => {
                        codec.send(&mut stream, &reply)?;
                        return Ok(());
                    }
                    Action::Run { single_step } => {
                        let reply = dispatcher.run(core, &mut stream, cancel, single_step)?;
                        codec.send(&mut stream, &reply)?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::thread;

    use super::*;

    #[derive(Default)]
    struct MockCore {
        regs: [u8; 32],
        sreg: u8,
        pc: u32,
    }

    impl CoreOps for MockCore {
        fn read_reg(&self, num: u8) -> u8 {
            self.regs[num as usize]
        }
        fn write_reg(&mut self, num: u8, val: u8) {
            self.regs[num as usize] = val;
        }
        fn read_sreg(&self) -> u8 {
            self.sreg
        }
        fn write_sreg(&mut self, val: u8) {
            self.sreg = val;
        }
        fn read_pc(&self) -> u32 {
            self.pc
        }
        fn write_pc(&mut self, val: u32) {
            self.pc = val;
        }
        fn max_pc(&self) -> u32 {
            u32::MAX
        }
        fn read_sram(&self, _addr: u32) -> u8 {
            0
        }
        fn write_sram(&mut self, _addr: u32, _val: u8) {}
        fn read_flash(&self, _addr: u32) -> u16 {
            0
        }
        fn write_flash(&mut self, _addr: u32, _val: u16) {}
        fn write_flash_lo8(&mut self, _addr: u32, _val: u8) {}
        fn write_flash_hi8(&mut self, _addr: u32, _val: u8) {}
        fn read_eeprom(&self, _addr: u32) -> u8 {
            0
        }
        fn write_eeprom(&mut self, _addr: u32, _val: u8) {}
        fn eeprom_len(&self) -> u32 {
            1024
        }
        fn insert_break(&mut self, _addr: u32) -> Result<(), avrsim_arch::Error> {
            Ok(())
        }
        fn remove_break(&mut self, _addr: u32) {}
        fn disable_breakpts(&mut self) {}
        fn enable_breakpts(&mut self) {}
        fn step(&mut self) -> Result<avrsim_arch::StepResult, avrsim_arch::Error> {
            self.pc += 1;
            Ok(avrsim_arch::StepResult::Ok(1))
        }
        fn reset(&mut self) {
            self.regs = [0; 32];
            self.sreg = 0;
            self.pc = 0;
        }
        fn io_fetch(&self, addr: u32) -> (u8, &str) {
            (addr as u8, "PORTB")
        }
        fn io_reg_count(&self) -> u32 {
            64
        }
        fn irq_raise(&mut self, _n: u32) {}
    }

    #[test]
    fn question_mark_round_trips_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = Arc::new(AtomicBool::new(false));

        let server = thread::spawn(move || {
            let mut core = MockCore::default();
            let (stream, _) = listener.accept().unwrap();
            stream.set_nodelay(true).unwrap();
            session(
                &mut core,
                stream,
                &ServerConfig { port, trace: false },
                &cancel,
            )
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .unwrap();
        client.write_all(b"$?#3f").unwrap();

        let mut buf = [0u8; 64];
        let mut total = 0;
        while total < 2 || buf[..total].windows(3).find(|w| *w == b"S05").is_none() {
            let n = client.read(&mut buf[total..]).unwrap();
            assert!(n > 0, "connection closed before S05 reply");
            total += n;
        }
        assert_eq!(&buf[..1], b"+");

        client.write_all(b"$k#6b").unwrap();
        server.join().unwrap().unwrap();
    }
}
