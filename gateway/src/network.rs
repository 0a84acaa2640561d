//! Local network interface lookup for the onboarding HTTP surface.

pub fn local_ipv4() -> Option<String> {
    get_if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .find(|iface| !iface.is_loopback() && iface.addr.ip().is_ipv4())
        .map(|iface| iface.addr.ip().to_string())
}
