//! Wi-Fi link and WebSocket channel
//!
//! CYW43 over PIO SPI provides the link; `embassy-net` provides DHCP and TCP;
//! `embedded-websocket` does the handshake and framing on top of one socket.

use core::net::Ipv4Addr;

use cyw43::JoinOptions;
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use embassy_executor::{SpawnError, Spawner};
use embassy_net::tcp::{State as TcpState, TcpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack, StackResources};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0};
use embassy_rp::pio::Pio;
use embassy_rp::Peri;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Write;
use embedded_websocket::{
    EmptyRng, WebSocketClient, WebSocketOptions, WebSocketReceiveMessageType,
    WebSocketSendMessageType, WebSocketState,
};
use heapless::Deque;
use static_cell::StaticCell;

use super::{cyw43_task, net_task, Irqs};
use crate::config::{
    COLLECTOR_HOST, COLLECTOR_PATH, COLLECTOR_PORT, CYW43_CLM_ADDR, CYW43_CLM_LEN, CYW43_FW_ADDR,
    CYW43_FW_LEN, WIFI_PASSWORD, WIFI_SSID, WS_FRAME_BUFFER_SIZE,
};
use crate::connectivity::{Connector, MessageChannel};
use crate::error::{Error, Result};
use crate::types::ChannelEvent;

pub type RadioRunner = cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>;
pub type NetRunner = embassy_net::Runner<'static, cyw43::NetDriver<'static>>;

const DHCP_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_RX_BUFFER_SIZE: usize = 1024;
const TCP_TX_BUFFER_SIZE: usize = 4096;
const WS_RX_BUFFER_SIZE: usize = 512;
const CONTROL_PAYLOAD_SIZE: usize = 125; // Max control frame payload
// Only seeds local port selection and TCP sequence numbers
const NET_SEED: u64 = 0x5643_2b34_d099_ee11;

static RADIO_STATE: StaticCell<cyw43::State> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static TCP_RX: StaticCell<[u8; TCP_RX_BUFFER_SIZE]> = StaticCell::new();
static TCP_TX: StaticCell<[u8; TCP_TX_BUFFER_SIZE]> = StaticCell::new();

/// Pins and blocks wired to the CYW43 on the Pico W
pub struct RadioPeripherals {
    pub pwr: Peri<'static, PIN_23>,
    pub cs: Peri<'static, PIN_25>,
    pub dio: Peri<'static, PIN_24>,
    pub clk: Peri<'static, PIN_29>,
    pub pio: Peri<'static, PIO0>,
    pub dma: Peri<'static, DMA_CH0>,
}

/// Bring up the radio and the network stack, spawning their runners
pub async fn start(
    spawner: &Spawner,
    radio: RadioPeripherals,
) -> Result<(WifiLink, WebSocketChannel), SpawnError> {
    // Flashed separately, see config
    let fw = unsafe { core::slice::from_raw_parts(CYW43_FW_ADDR as *const u8, CYW43_FW_LEN) };
    let clm = unsafe { core::slice::from_raw_parts(CYW43_CLM_ADDR as *const u8, CYW43_CLM_LEN) };

    let pwr = Output::new(radio.pwr, Level::Low);
    let cs = Output::new(radio.cs, Level::High);
    let mut pio = Pio::new(radio.pio, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        radio.dio,
        radio.clk,
        radio.dma,
    );

    let state = RADIO_STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    spawner.spawn(cyw43_task(runner))?;

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;

    let (stack, runner) = embassy_net::new(
        net_device,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        NET_SEED,
    );
    spawner.spawn(net_task(runner))?;

    info!("Network stack up, SSID \"{}\"", WIFI_SSID);

    let socket = TcpSocket::new(
        stack,
        TCP_RX.init([0; TCP_RX_BUFFER_SIZE]),
        TCP_TX.init([0; TCP_TX_BUFFER_SIZE]),
    );

    Ok((WifiLink::new(control, stack), WebSocketChannel::new(stack, socket)))
}

// ===================================================================
// Wi-Fi Link
// ===================================================================

pub struct WifiLink {
    control: cyw43::Control<'static>,
    stack: Stack<'static>,
}

impl WifiLink {
    pub fn new(control: cyw43::Control<'static>, stack: Stack<'static>) -> Self {
        Self { control, stack }
    }
}

impl Connector for WifiLink {
    async fn connect(&mut self) -> Result<()> {
        if self
            .control
            .join(WIFI_SSID, JoinOptions::new(WIFI_PASSWORD.as_bytes()))
            .await
            .is_err()
        {
            debug!("Join failed");
            return Err(Error::LinkConnect);
        }

        if with_timeout(DHCP_TIMEOUT, self.stack.wait_config_up())
            .await
            .is_err()
        {
            debug!("DHCP timed out");
            self.control.leave().await;
            return Err(Error::LinkConnect);
        }

        if let Some(config) = self.stack.config_v4() {
            info!("Wi-Fi address {}", config.address);
        }
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.stack.is_link_up() && self.stack.is_config_up()
    }
}

// ===================================================================
// WebSocket Channel
// ===================================================================

pub struct WebSocketChannel {
    stack: Stack<'static>,
    socket: TcpSocket<'static>,
    ws: WebSocketClient<EmptyRng>,
    frame: [u8; WS_FRAME_BUFFER_SIZE],
    rx: [u8; WS_RX_BUFFER_SIZE],
    rx_len: usize,
    events: Deque<ChannelEvent, 4>,
}

impl WebSocketChannel {
    pub fn new(stack: Stack<'static>, socket: TcpSocket<'static>) -> Self {
        Self {
            stack,
            socket,
            ws: WebSocketClient::new_client(EmptyRng::new()),
            frame: [0; WS_FRAME_BUFFER_SIZE],
            rx: [0; WS_RX_BUFFER_SIZE],
            rx_len: 0,
            events: Deque::new(),
        }
    }

    fn push_event(&mut self, event: ChannelEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    fn drop_connection(&mut self) {
        self.socket.abort();
        self.ws.state = WebSocketState::Closed;
        self.rx_len = 0;
    }

    async fn handshake(&mut self) -> Result<()> {
        let options = WebSocketOptions {
            path: COLLECTOR_PATH,
            host: COLLECTOR_HOST,
            origin: COLLECTOR_HOST,
            sub_protocols: None,
            additional_headers: None,
        };
        let (len, key) = self
            .ws
            .client_connect(&options, &mut self.frame)
            .map_err(|_| Error::ChannelConnect)?;
        self.socket
            .write_all(&self.frame[..len])
            .await
            .map_err(|_| Error::ChannelConnect)?;

        let mut filled = 0;
        loop {
            if filled == self.rx.len() {
                return Err(Error::ChannelConnect);
            }
            let n = self
                .socket
                .read(&mut self.rx[filled..])
                .await
                .map_err(|_| Error::ChannelConnect)?;
            if n == 0 {
                return Err(Error::ChannelConnect);
            }
            filled += n;

            match self.ws.client_accept(&key, &self.rx[..filled]) {
                Ok((consumed, _)) => {
                    // Frames that arrived right behind the HTTP response
                    self.rx.copy_within(consumed..filled, 0);
                    self.rx_len = filled - consumed;
                    return Ok(());
                }
                Err(embedded_websocket::Error::HttpHeaderIncomplete) => continue,
                Err(_) => return Err(Error::ChannelConnect),
            }
        }
    }

    async fn send_frame(&mut self, kind: WebSocketSendMessageType, payload: &[u8]) -> Result<()> {
        let n = self
            .ws
            .write(kind, true, payload, &mut self.frame)
            .map_err(|_| Error::Send)?;
        if self.socket.write_all(&self.frame[..n]).await.is_err() {
            self.drop_connection();
            return Err(Error::Send);
        }
        Ok(())
    }
}

impl Connector for WebSocketChannel {
    async fn connect(&mut self) -> Result<()> {
        let address: Ipv4Addr = COLLECTOR_HOST.parse().map_err(|_| Error::ChannelConnect)?;

        self.drop_connection();
        self.ws = WebSocketClient::new_client(EmptyRng::new());
        self.socket.set_timeout(Some(TCP_TIMEOUT));

        let endpoint = IpEndpoint::new(IpAddress::Ipv4(address), COLLECTOR_PORT);
        if self.socket.connect(endpoint).await.is_err() {
            self.drop_connection();
            return Err(Error::ChannelConnect);
        }

        if let Err(e) = self.handshake().await {
            self.drop_connection();
            return Err(e);
        }

        self.push_event(ChannelEvent::Opened);
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.stack.is_link_up()
            && self.socket.state() == TcpState::Established
            && self.ws.state == WebSocketState::Open
    }

    async fn poll_event(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.ws.state != WebSocketState::Open {
            return None;
        }

        if self.socket.can_recv() && self.rx_len < self.rx.len() {
            match self.socket.read(&mut self.rx[self.rx_len..]).await {
                Ok(0) | Err(_) => {
                    self.drop_connection();
                    return Some(ChannelEvent::Closed);
                }
                Ok(n) => self.rx_len += n,
            }
        }
        if self.rx_len == 0 {
            return None;
        }

        let mut payload = [0u8; CONTROL_PAYLOAD_SIZE];
        let read = match self.ws.read(&self.rx[..self.rx_len], &mut payload) {
            Ok(read) => read,
            Err(embedded_websocket::Error::ReadFrameIncomplete) => return None,
            Err(_) => {
                self.rx_len = 0;
                return None;
            }
        };
        self.rx.copy_within(read.len_from..self.rx_len, 0);
        self.rx_len -= read.len_from;

        match read.message_type {
            WebSocketReceiveMessageType::Ping => {
                let _ = self
                    .send_frame(WebSocketSendMessageType::Pong, &payload[..read.len_to])
                    .await;
                Some(ChannelEvent::Ping)
            }
            WebSocketReceiveMessageType::Pong => Some(ChannelEvent::Pong),
            WebSocketReceiveMessageType::CloseMustReply => {
                let _ = self
                    .send_frame(WebSocketSendMessageType::CloseReply, &payload[..read.len_to])
                    .await;
                self.drop_connection();
                Some(ChannelEvent::Closed)
            }
            WebSocketReceiveMessageType::CloseCompleted => {
                self.drop_connection();
                Some(ChannelEvent::Closed)
            }
            WebSocketReceiveMessageType::Text | WebSocketReceiveMessageType::Binary => {
                debug!("Ignoring {} bytes from collector", read.len_to);
                None
            }
        }
    }
}

impl MessageChannel for WebSocketChannel {
    async fn send_binary(&mut self, payload: &[u8]) -> Result<()> {
        if self.ws.state != WebSocketState::Open {
            return Err(Error::ChannelClosed);
        }
        self.send_frame(WebSocketSendMessageType::Binary, payload).await
    }
}
