use core::net::Ipv4Addr;

use log::{debug, info, warn};

use super::{
    ChipStatus, DEFAULT_EVENT_MASK, MAX_KEY_LEN, MAX_SSID_LEN, ManagerConfig, ManagerState,
    SMART_CONFIG_PREFIX, ScanEntry, WifiError, scan,
};
use crate::{
    events::{AsyncEvents, StatusFlags},
    host::{
        ConnectionPolicy, HostResult, IpConfig, PatchRequest, SCAN_RESULT_LEN, ScanParams,
        Security, SocketKind, Sockets, Wlan,
    },
    net::{Client, SocketError},
};

type WifiResult<T = ()> = Result<T, WifiError>;

/// Converts a host-order address to the chip's reversed byte order.
pub(crate) fn to_wire(ip: Ipv4Addr) -> u32 {
    u32::from(ip).swap_bytes()
}

/// Sequences chip commands for bring-up, scanning, connecting and network
/// configuration.
///
/// Every bounded wait pumps the host between delays so a missed interrupt edge
/// cannot stall progress.
pub struct ConnectionManager<H> {
    host: H,
    config: ManagerConfig,
    state: ManagerState,
    scan_record: [u8; SCAN_RESULT_LEN],
}

impl<H: Wlan> ConnectionManager<H> {
    pub fn new(host: H, config: ManagerConfig) -> Self {
        Self {
            host,
            config,
            state: ManagerState::Uninitialized,
            scan_record: [0; SCAN_RESULT_LEN],
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn release(self) -> H {
        self.host
    }

    pub fn config(&self) -> ManagerConfig {
        self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state != ManagerState::Uninitialized
    }

    /// Lifecycle state. A link lost since the last connect reads as
    /// `Disconnected`.
    pub fn state(&self) -> ManagerState {
        match self.state {
            ManagerState::Connected if !self.check_connected() => ManagerState::Disconnected,
            state => state,
        }
    }

    pub fn check_connected(&self) -> bool {
        self.host.events().is_connected()
    }

    pub fn check_dhcp(&self) -> bool {
        self.host.events().has_dhcp()
    }

    pub fn check_smart_config_finished(&self) -> bool {
        self.host.events().smart_config_finished()
    }

    /// Brings the chip up.
    ///
    /// Without `use_smart_config_data` stored profiles are erased and the chip
    /// only connects on request. With it, the chip reconnects from its stored
    /// profile; this waits for the link and advertises `device_name` over
    /// mDNS once a lease is held.
    pub fn begin(
        &mut self,
        patch: PatchRequest,
        use_smart_config_data: bool,
        device_name: &str,
    ) -> WifiResult {
        if self.is_initialized() {
            return Ok(());
        }

        let Some(irq_channel) = self.config.irq_map.channel_for(self.config.irq_pin) else {
            warn!("cc3k: irq pin={} is not an interrupt pin", self.config.irq_pin);
            return Err(WifiError::IrqPinNotMapped);
        };

        debug!("cc3k: init irq_channel={}", irq_channel);
        self.host.open(irq_channel)?;
        self.host.start(patch)?;

        if use_smart_config_data {
            best_effort(
                self.host.set_connection_policy(ConnectionPolicy::PROFILES),
                "set connection policy",
            );
        } else {
            best_effort(
                self.host.set_connection_policy(ConnectionPolicy::MANUAL),
                "set connection policy",
            );
            best_effort(self.host.delete_profiles(), "delete profiles");
        }

        self.host.set_event_mask(DEFAULT_EVENT_MASK).inspect_err(|status| {
            warn!("cc3k: set event mask failed status={}", status.0)
        })?;

        self.state = ManagerState::Initialized;
        info!("cc3k: driver initialised");

        if use_smart_config_data {
            if !self.wait_for(StatusFlags::CONNECTED, self.config.connect_timeout_ms) {
                warn!("cc3k: timed out connecting with stored profile");
                return Err(WifiError::Timeout);
            }
            self.state = ManagerState::Connected;
            self.advertise_after_link(device_name);
        }

        Ok(())
    }

    /// Stops the chip, waits, and starts it again.
    pub fn reboot(&mut self, patch: PatchRequest) -> WifiResult {
        self.require_init()?;
        self.host.stop()?;
        self.settle(self.config.reboot_delay_ms);
        self.host.start(patch)?;
        Ok(())
    }

    pub fn stop(&mut self) -> WifiResult {
        self.require_init()?;
        self.host.stop()?;
        Ok(())
    }

    pub fn disconnect(&mut self) -> WifiResult {
        self.require_init()?;
        self.host.disconnect()?;
        self.state = ManagerState::Disconnected;
        Ok(())
    }

    /// Switches to manual connection and erases every stored profile.
    pub fn delete_profiles(&mut self) -> WifiResult {
        self.require_init()?;
        self.host
            .set_connection_policy(ConnectionPolicy::MANUAL)
            .inspect_err(|status| warn!("cc3k: set connection policy failed status={}", status.0))?;
        self.host
            .delete_profiles()
            .inspect_err(|status| warn!("cc3k: delete profiles failed status={}", status.0))?;
        Ok(())
    }

    pub fn mac_address(&mut self) -> WifiResult<[u8; 6]> {
        self.require_init()?;
        Ok(self.host.read_mac()?)
    }

    /// Stores a new MAC address and restarts the chip to apply it.
    pub fn set_mac_address(&mut self, mac: &[u8; 6]) -> WifiResult {
        self.require_init()?;
        if mac[0] == 0 {
            return Err(WifiError::InvalidArgument);
        }
        self.host.write_mac(mac)?;
        self.power_cycle(self.config.apply_delay_ms)
    }

    /// Stores a static network configuration and restarts the chip to apply
    /// it. The chip keeps the setting across resets.
    pub fn set_static_ip(
        &mut self,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: Ipv4Addr,
    ) -> WifiResult {
        self.require_init()?;
        self.host
            .configure_ip(to_wire(ip), to_wire(netmask), to_wire(gateway), to_wire(dns))?;
        self.power_cycle(self.config.apply_delay_ms)
    }

    /// Reverts to DHCP.
    pub fn set_dhcp(&mut self) -> WifiResult {
        let unspecified = Ipv4Addr::UNSPECIFIED;
        self.set_static_ip(unspecified, unspecified, unspecified, unspecified)
    }

    /// Current address. Requires a link with a lease.
    pub fn ip_address(&mut self) -> WifiResult<Ipv4Addr> {
        let config = self.ip_config()?;
        // The chip reports this octet last on the wire; zero means unassigned.
        if config.ip.octets()[0] == 0 {
            return Err(WifiError::NotConnected);
        }
        Ok(config.ip)
    }

    pub fn ip_config(&mut self) -> WifiResult<IpConfig> {
        self.require_init()?;
        self.require_lease()?;
        Ok(self.host.ip_config()?)
    }

    /// Firmware patch version as `(major, minor)`.
    pub fn firmware_version(&mut self) -> WifiResult<(u8, u8)> {
        self.require_init()?;
        let [major, minor] = self.host.firmware_version()?;
        Ok((major, minor))
    }

    pub fn status(&mut self) -> ChipStatus {
        if !self.is_initialized() {
            return ChipStatus::Disconnected;
        }
        self.host
            .status()
            .map_or(ChipStatus::Disconnected, ChipStatus::from_raw)
    }

    /// Runs one scan window and returns the number of networks found.
    ///
    /// Walk the results with [`ConnectionManager::next_ssid`].
    pub fn start_ssid_scan(&mut self) -> WifiResult<u32> {
        self.require_init()?;
        self.scan_ssids(self.config.scan_window_ms)?;
        self.state = ManagerState::Scanning;
        self.settle(self.config.scan_settle_ms);

        self.host
            .scan_result(&mut self.scan_record)
            .inspect_err(|status| warn!("cc3k: ssid scan failed status={}", status.0))?;
        let count = scan::network_count(&self.scan_record);
        debug!("cc3k: scan found networks={}", count);
        Ok(count)
    }

    /// Returns the current scan entry and fetches the next one.
    pub fn next_ssid(&mut self) -> WifiResult<ScanEntry> {
        self.require_init()?;
        let entry = ScanEntry::decode(&self.scan_record);
        self.host.scan_result(&mut self.scan_record)?;
        Ok(entry)
    }

    pub fn stop_ssid_scan(&mut self) -> WifiResult {
        self.scan_ssids(0)?;
        if self.state == ManagerState::Scanning {
            self.state = ManagerState::Initialized;
        }
        Ok(())
    }

    /// Requests a connection to an open network. Completion arrives as an
    /// async event.
    pub fn connect_open(&mut self, ssid: &str) -> WifiResult {
        self.require_init()?;
        validate_credentials(ssid, "")?;
        self.request_connect(Security::Unsecured, ssid, "")
    }

    /// Requests a connection to a secured network. Completion arrives as an
    /// async event.
    pub fn connect_secure(&mut self, ssid: &str, key: &str, security: Security) -> WifiResult {
        self.require_init()?;
        validate_credentials(ssid, key)?;
        self.request_connect(security, ssid, key)
    }

    /// Scans, requests a connection and waits for the link, up to `attempts`
    /// times (forever when zero).
    ///
    /// Succeeds as soon as the link is observed up, whichever attempt raised
    /// it.
    pub fn connect_to_ap(
        &mut self,
        ssid: &str,
        key: &str,
        security: Security,
        attempts: u8,
    ) -> WifiResult {
        self.require_init()?;
        validate_credentials(ssid, key)?;

        let retry_forever = attempts == 0;
        let mut remaining = attempts;

        while !self.check_connected() {
            if !retry_forever {
                if remaining == 0 {
                    warn!("cc3k: giving up on ssid={} after {} attempts", ssid, attempts);
                    return Err(WifiError::Timeout);
                }
                remaining -= 1;
            }

            self.host.poll();
            // The chip needs a scan pass before it will associate.
            best_effort(self.scan_ssids(self.config.scan_window_ms), "start scan");
            self.settle(self.config.scan_settle_ms);
            best_effort(self.scan_ssids(0), "stop scan");

            info!("cc3k: connecting to ssid={}", ssid);
            let requested = if security == Security::Unsecured || key.is_empty() {
                self.request_connect(Security::Unsecured, ssid, "")
            } else {
                self.request_connect(security, ssid, key)
            };
            if let Err(err) = requested {
                warn!("cc3k: connect request failed: {:?}", err);
                continue;
            }

            if !self.wait_for(StatusFlags::CONNECTED, self.config.connect_timeout_ms) {
                warn!("cc3k: timed out waiting for ssid={}", ssid);
            }
        }

        info!("cc3k: connected to ssid={}", ssid);
        self.state = ManagerState::Connected;
        Ok(())
    }

    /// Provisions credentials from the smart config phone app.
    ///
    /// Erases stored profiles, listens for up to the smart config timeout,
    /// then restarts with profile-based auto-connect and waits for the link.
    /// With `aes_key` the provisioning payload is decrypted on the chip.
    pub fn start_smart_config(&mut self, device_name: &str, aes_key: Option<&[u8; 16]>) -> WifiResult {
        self.host.events().clear();
        self.require_init()?;

        self.host
            .set_connection_policy(ConnectionPolicy::MANUAL)
            .inspect_err(|status| warn!("cc3k: set connection policy failed status={}", status.0))?;
        self.host
            .delete_profiles()
            .inspect_err(|status| warn!("cc3k: delete profiles failed status={}", status.0))?;

        while self.check_connected() {
            self.host.poll();
            self.host
                .disconnect()
                .inspect_err(|status| warn!("cc3k: disconnect failed status={}", status.0))?;
            self.host.delay_ms(self.config.poll_interval_ms);
        }

        self.power_cycle(self.config.restart_delay_ms)?;

        self.host.create_aes_entry()?;
        if let Some(key) = aes_key {
            self.host.write_aes_key(key)?;
        }
        self.host.set_smart_config_prefix(&SMART_CONFIG_PREFIX)?;
        self.host.start_smart_config(aes_key.is_some())?;
        info!("cc3k: waiting for smart config");

        if !self.wait_for(
            StatusFlags::SMART_CONFIG_FINISHED,
            self.config.smart_config_timeout_ms,
        ) {
            warn!("cc3k: smart config timed out");
            return Err(WifiError::Timeout);
        }
        info!("cc3k: got smart config data");

        if aes_key.is_some() {
            self.host.process_smart_config()?;
        }

        self.host.set_connection_policy(ConnectionPolicy::PROFILES)?;
        self.power_cycle(self.config.restart_delay_ms)?;
        self.host.set_event_mask(DEFAULT_EVENT_MASK)?;

        if !self.wait_for(StatusFlags::CONNECTED, self.config.connect_timeout_ms) {
            warn!("cc3k: timed out waiting to connect");
            return Err(WifiError::Timeout);
        }
        self.state = ManagerState::Connected;
        self.advertise_after_link(device_name);
        Ok(())
    }

    /// Pings `ip` and returns the packets received.
    ///
    /// Waits up to `attempts * timeout_ms * 2` for the chip's report, pumping
    /// the host meanwhile. Calls must not overlap: reports are not correlated
    /// to requests.
    pub fn ping(&mut self, ip: Ipv4Addr, attempts: u8, timeout_ms: u16, size: u8) -> u32 {
        if !self.is_initialized() || self.require_lease().is_err() {
            return 0;
        }

        let events = self.host.events();
        events.reset_ping_report();

        if let Err(status) = self.host.send_ping(
            to_wire(ip),
            u32::from(attempts),
            u32::from(size),
            u32::from(timeout_ms),
        ) {
            warn!("cc3k: ping request failed status={}", status.0);
            return 0;
        }
        let window_ms = u32::from(timeout_ms) * u32::from(attempts) * 2;
        if !self.wait_until(window_ms, |events| events.ping_report_count() > 0) {
            debug!("cc3k: no ping report within window_ms={}", window_ms);
        }

        let events = self.host.events();
        if events.ping_report_count() == 0 {
            return 0;
        }
        events.ping_report().packets_received
    }

    /// Resolves `hostname` through the chip's DNS client. Calls must not
    /// overlap.
    pub fn resolve(&mut self, hostname: &str) -> WifiResult<Ipv4Addr> {
        self.require_init()?;
        self.require_lease()?;
        Ok(self.host.resolve(hostname)?)
    }

    fn scan_ssids(&mut self, duration_ms: u32) -> WifiResult {
        self.require_init()?;
        if duration_ms > 0 {
            debug!("cc3k: start ssid scan window_ms={}", duration_ms);
        }
        self.host
            .set_scan_params(&ScanParams::new(duration_ms))
            .inspect_err(|status| warn!("cc3k: set scan params failed status={}", status.0))?;
        Ok(())
    }

    fn request_connect(&mut self, security: Security, ssid: &str, key: &str) -> WifiResult {
        self.host
            .set_connection_policy(ConnectionPolicy::MANUAL)
            .inspect_err(|status| warn!("cc3k: set connection policy failed status={}", status.0))?;
        self.settle(self.config.policy_settle_ms);
        self.host
            .connect_ap(security, ssid.as_bytes(), key.as_bytes())
            .inspect_err(|status| warn!("cc3k: ssid connection failed status={}", status.0))?;
        self.state = ManagerState::Connecting;
        Ok(())
    }

    fn advertise_after_link(&mut self, device_name: &str) {
        let link_settle_ms = self.config.link_settle_ms;
        let leased = self.wait_until(link_settle_ms, AsyncEvents::has_dhcp);
        if leased && !device_name.is_empty() {
            best_effort(self.host.advertise_mdns(device_name), "advertise mdns");
        }
    }

    fn power_cycle(&mut self, delay_ms: u32) -> WifiResult {
        self.host.stop()?;
        self.settle(delay_ms);
        self.host.start(PatchRequest::default())?;
        Ok(())
    }

    /// Polls until all of `flags` are set or `timeout_ms` elapses.
    fn wait_for(&mut self, flags: StatusFlags, timeout_ms: u32) -> bool {
        self.wait_until(timeout_ms, |events| events.contains(flags))
    }

    /// Polls until `done` holds or `timeout_ms` elapses.
    fn wait_until(&mut self, timeout_ms: u32, done: impl Fn(&AsyncEvents) -> bool) -> bool {
        let step_ms = self.config.poll_interval_ms.max(1);
        let mut waited_ms = 0u32;

        loop {
            self.host.poll();
            if done(self.host.events()) {
                return true;
            }
            if waited_ms >= timeout_ms {
                return false;
            }
            let delay_ms = step_ms.min(timeout_ms - waited_ms);
            self.host.delay_ms(delay_ms);
            waited_ms = waited_ms.saturating_add(delay_ms);
        }
    }

    /// Waits out `ms` while still servicing the chip.
    fn settle(&mut self, ms: u32) {
        self.wait_until(ms, |_| false);
    }

    fn require_init(&self) -> WifiResult {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(WifiError::NotInitialized)
        }
    }

    fn require_lease(&self) -> WifiResult {
        if self.check_connected() && self.check_dhcp() {
            Ok(())
        } else {
            Err(WifiError::NotConnected)
        }
    }
}

impl<H: Wlan + Sockets> ConnectionManager<H> {
    /// Opens a TCP connection to `ip:port`.
    pub fn connect_tcp(&mut self, ip: Ipv4Addr, port: u16) -> Result<Client, SocketError> {
        Client::connect(&mut self.host, SocketKind::Tcp, ip, port)
    }

    /// Opens a connected UDP socket to `ip:port`.
    pub fn connect_udp(&mut self, ip: Ipv4Addr, port: u16) -> Result<Client, SocketError> {
        Client::connect(&mut self.host, SocketKind::Udp, ip, port)
    }
}

fn validate_credentials(ssid: &str, key: &str) -> WifiResult {
    if ssid.len() > MAX_SSID_LEN || key.len() > MAX_KEY_LEN {
        warn!(
            "cc3k: ssid and key must be at most {} bytes",
            MAX_SSID_LEN.max(MAX_KEY_LEN)
        );
        return Err(WifiError::InvalidArgument);
    }
    Ok(())
}

fn best_effort<E: core::fmt::Debug>(result: Result<(), E>, what: &str) {
    if let Err(err) = result {
        warn!("cc3k: {} failed: {:?}", what, err);
    }
}
