use std::net::Ipv4Addr;

/// Non-loopback IPv4 addresses of this host, in interface order.
#[cfg(unix)]
pub fn ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();

    if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
        tracing::warn!(error = %std::io::Error::last_os_error(), "getifaddrs failed");
        return addrs;
    }

    let mut cur = ifap;
    while !cur.is_null() {
        // The list stays valid until freeifaddrs below.
        let ifa = unsafe { &*cur };
        if !ifa.ifa_addr.is_null() {
            let family = unsafe { (*ifa.ifa_addr).sa_family } as i32;
            if family == libc::AF_INET {
                let sin = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_in) };
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                if !ip.is_loopback() && !addrs.contains(&ip) {
                    addrs.push(ip);
                }
            }
        }
        cur = ifa.ifa_next;
    }

    unsafe { libc::freeifaddrs(ifap) };
    addrs
}

#[cfg(not(unix))]
pub fn ipv4_addresses() -> Vec<Ipv4Addr> {
    Vec::new()
}
