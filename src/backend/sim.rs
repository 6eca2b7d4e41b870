//! An in-memory panel for host builds and tests.
//!
//! Transfers land in a pixel array that can be inspected through a
//! [`SimHandle`]. Completion can be immediate or delivered from another
//! thread after a fixed delay, the way a DMA-driven bus reports it.

use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use log::debug;

use super::Backend;
use super::BackendCaps;
use super::TxBuffer;
use super::TxDone;
use crate::bus::BusConfig;
use crate::framebuffer::MemoryCaps;
use crate::region::PixelRegion;
use crate::region::Rotation;
use crate::sync::lock;
use crate::Error;
use crate::Result;

/// One `tx_color` call as seen by the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRecord {
    pub cmd: i32,
    pub region: PixelRegion,
    pub rotation: Rotation,
    pub last_update: bool,
    /// Address of the transmitted buffer, to tell buffers apart.
    pub buffer: usize,
    pub len: usize,
}

#[derive(Debug, Default)]
struct SimState {
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    screen: Vec<u8>,
    log: Vec<TxRecord>,
    params: BTreeMap<i32, Vec<u8>>,
    in_flight: usize,
    max_in_flight: usize,
    fail_next: Option<i32>,
    deleted: bool,
}

impl SimState {
    /// Copies a finished transfer onto the screen.
    fn land(&mut self, region: &PixelRegion, windowed: bool, bytes: &[u8]) {
        if !windowed {
            let len = bytes.len().min(self.screen.len());
            self.screen[..len].copy_from_slice(&bytes[..len]);
            return;
        }
        let bpp = self.bytes_per_pixel;
        let line = region.width() * bpp;
        if line == 0 {
            return;
        }
        for (row, src) in bytes.chunks_exact(line).enumerate() {
            let y = region.y_start as usize + row;
            if y >= self.height || region.x_end as usize >= self.width {
                break;
            }
            let start = (y * self.width + region.x_start as usize) * bpp;
            self.screen[start..start + line].copy_from_slice(src);
        }
    }
}

/// Inspection handle, usable after the panel has been moved into a bus.
#[derive(Clone, Debug)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Current panel contents, row-major.
    pub fn screen(&self) -> Vec<u8> {
        lock(&self.state).screen.clone()
    }

    pub fn log(&self) -> Vec<TxRecord> {
        lock(&self.state).log.clone()
    }

    /// The last parameter bytes sent with `cmd`.
    pub fn param(&self, cmd: i32) -> Option<Vec<u8>> {
        lock(&self.state).params.get(&cmd).cloned()
    }

    /// Highest number of transfers that were ever in flight together.
    pub fn max_in_flight(&self) -> usize {
        lock(&self.state).max_in_flight
    }

    /// Makes the next transfer complete with `TransmitFailed(code)`.
    pub fn fail_next_tx(&self, code: i32) {
        lock(&self.state).fail_next = Some(code);
    }

    pub fn is_deleted(&self) -> bool {
        lock(&self.state).deleted
    }
}

pub struct SimPanel {
    caps: BackendCaps,
    delay: Option<Duration>,
    init_failure: Option<i32>,
    lanes: u8,
    state: Arc<Mutex<SimState>>,
    done: Option<TxDone>,
}

impl Default for SimPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPanel {
    /// A windowed panel that completes transfers immediately.
    pub fn new() -> Self {
        Self {
            caps: BackendCaps::default(),
            delay: None,
            init_failure: None,
            lanes: 1,
            state: Arc::new(Mutex::new(SimState::default())),
            done: None,
        }
    }

    /// The panel takes whole frames only, like an RGB or LED bus.
    #[must_use]
    pub fn full_frame(mut self) -> Self {
        self.caps.windowed = false;
        self
    }

    /// Completes each transfer from a separate thread after `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_buffer_caps(mut self, caps: MemoryCaps) -> Self {
        self.caps.buffer_caps = caps;
        self
    }

    #[must_use]
    pub fn with_hw_byte_swap(mut self) -> Self {
        self.caps.hw_byte_swap = true;
        self
    }

    #[must_use]
    pub fn with_frame_padding(mut self, padding: usize) -> Self {
        self.caps.frame_padding = padding;
        self
    }

    #[must_use]
    pub fn with_lanes(mut self, lanes: u8) -> Self {
        self.lanes = lanes;
        self
    }

    /// Makes `init` fail with `code`.
    #[must_use]
    pub fn fail_init(mut self, code: i32) -> Self {
        self.init_failure = Some(code);
        self
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Backend for SimPanel {
    fn init(&mut self, config: &BusConfig, done: TxDone) -> Result<()> {
        if let Some(code) = self.init_failure {
            return Err(Error::InitFailed {
                code,
                message: "simulated panel refused to start".into(),
            });
        }
        let mut state = lock(&self.state);
        state.width = config.width as usize;
        state.height = config.height as usize;
        state.bytes_per_pixel = config.bytes_per_pixel();
        state.screen = vec![0; state.width * state.height * state.bytes_per_pixel];
        drop(state);
        self.done = Some(done);
        debug!("sim panel {}x{} ready", config.width, config.height);
        Ok(())
    }

    fn caps(&self) -> BackendCaps {
        self.caps
    }

    fn tx_param(&mut self, cmd: i32, params: &[u8]) -> Result<()> {
        lock(&self.state).params.insert(cmd, params.to_vec());
        Ok(())
    }

    fn rx_param(&mut self, cmd: i32, buffer: &mut [u8]) -> Result<()> {
        let state = lock(&self.state);
        let value = state.params.get(&cmd).ok_or(Error::InvalidArg)?;
        let len = value.len().min(buffer.len());
        buffer[..len].copy_from_slice(&value[..len]);
        Ok(())
    }

    fn tx_color(
        &mut self,
        cmd: i32,
        buffer: TxBuffer,
        region: &PixelRegion,
        rotation: Rotation,
        last_update: bool,
    ) -> Result<()> {
        let done = self.done.clone().ok_or(Error::InvalidState)?;
        let result = {
            let mut state = lock(&self.state);
            state.log.push(TxRecord {
                cmd,
                region: *region,
                rotation,
                last_update,
                buffer: buffer.buffer().as_ptr() as usize,
                len: buffer.len(),
            });
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            match state.fail_next.take() {
                Some(code) => Err(Error::TransmitFailed(code)),
                None => Ok(()),
            }
        };

        let state = Arc::clone(&self.state);
        let windowed = self.caps.windowed;
        let region = *region;
        let finish = move || {
            {
                let mut state = lock(&state);
                if result.is_ok() {
                    state.land(&region, windowed, &buffer.to_vec());
                }
                state.in_flight -= 1;
            }
            done.complete(buffer, result);
        };

        match self.delay {
            Some(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    finish();
                });
            }
            None => finish(),
        }
        Ok(())
    }

    fn del(&mut self) -> Result<()> {
        lock(&self.state).deleted = true;
        self.done = None;
        Ok(())
    }

    fn lane_count(&self) -> u8 {
        self.lanes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;

    fn ready(panel: SimPanel) -> (SimPanel, TxDone) {
        let mut panel = panel;
        let done = TxDone::new();
        panel.init(&BusConfig::new(4, 2, 8), done.clone()).unwrap();
        (panel, done)
    }

    #[test]
    fn test_window_lands_on_screen() {
        let (mut panel, done) = ready(SimPanel::new());
        let handle = panel.handle();
        let frame = FrameBuffer::from_vec((1..=8).collect(), MemoryCaps::NONE).into_shared();
        let region = PixelRegion::new(2, 0, 3, 1).within(4, 2);
        let tx = TxBuffer::window(frame, &region, 1).unwrap();
        done.reset();
        panel.tx_color(-1, tx, &region, Rotation::Deg0, true).unwrap();
        assert_eq!(done.wait(None), Some(Ok(())));
        assert_eq!(handle.screen(), vec![0, 0, 3, 4, 0, 0, 7, 8]);
        assert_eq!(handle.log()[0].len, 4);
    }

    #[test]
    fn test_full_frame_panel() {
        let (mut panel, done) = ready(SimPanel::new().full_frame());
        assert!(!panel.caps().windowed);
        let handle = panel.handle();
        let frame = FrameBuffer::from_vec(vec![9; 8], MemoryCaps::NONE).into_shared();
        let region = PixelRegion::full(4, 2);
        done.reset();
        panel
            .tx_color(-1, TxBuffer::packed(frame, 8), &region, Rotation::Deg0, true)
            .unwrap();
        done.wait(None);
        assert_eq!(handle.screen(), vec![9; 8]);
    }

    #[test]
    fn test_delayed_completion() {
        let (mut panel, done) = ready(SimPanel::new().with_delay(Duration::from_millis(30)));
        let handle = panel.handle();
        let frame = FrameBuffer::from_vec(vec![1; 8], MemoryCaps::NONE).into_shared();
        let tx = TxBuffer::packed(Arc::clone(&frame), 8);
        done.reset();
        panel
            .tx_color(-1, tx, &PixelRegion::full(4, 2), Rotation::Deg0, true)
            .unwrap();
        assert_eq!(done.wait(Some(Duration::from_millis(1))), None);
        assert_eq!(done.wait(None), Some(Ok(())));
        assert_eq!(Arc::strong_count(&frame), 1);
        assert_eq!(handle.max_in_flight(), 1);
    }

    #[test]
    fn test_failed_transfer_leaves_screen() {
        let (mut panel, done) = ready(SimPanel::new());
        let handle = panel.handle();
        handle.fail_next_tx(7);
        let frame = FrameBuffer::from_vec(vec![1; 8], MemoryCaps::NONE).into_shared();
        let region = PixelRegion::full(4, 2);
        done.reset();
        panel
            .tx_color(-1, TxBuffer::packed(frame, 8), &region, Rotation::Deg0, true)
            .unwrap();
        assert_eq!(done.wait(None), Some(Err(Error::TransmitFailed(7))));
        assert_eq!(handle.screen(), vec![0; 8]);
    }

    #[test]
    fn test_params_round_trip() {
        let (mut panel, _) = ready(SimPanel::new());
        panel.tx_param(0x36, &[0x48]).unwrap();
        let mut out = [0u8; 1];
        panel.rx_param(0x36, &mut out).unwrap();
        assert_eq!(out, [0x48]);
        assert_eq!(panel.rx_param(0x37, &mut out).unwrap_err(), Error::InvalidArg);
    }

    #[test]
    fn test_init_failure() {
        let mut panel = SimPanel::new().fail_init(0x105);
        let err = panel
            .init(&BusConfig::new(4, 2, 16), TxDone::new())
            .unwrap_err();
        assert_eq!(err.code(), 0x105);
    }
}
