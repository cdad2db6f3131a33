//! In-namespace interface configuration via ioctls
//!
//! Runs inside the container after the root pivot, where iproute2 may not
//! exist, so everything goes through an `AF_INET` control socket.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, OwnedFd};

use capsule_core::{Error, Result};
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socket};

use crate::config::{Ipv4Cidr, MAX_INTERFACE_NAME};

struct ControlSocket(OwnedFd);

impl ControlSocket {
    fn open() -> Result<Self> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|e| Error::network(format!("Failed to open control socket: {e}")))?;
        Ok(Self(fd))
    }

    fn raw(&self) -> libc::c_int {
        self.0.as_raw_fd()
    }
}

fn check(ret: libc::c_int, what: &str) -> Result<()> {
    if ret < 0 {
        let err = io::Error::last_os_error();
        return Err(Error::network(format!("{what} failed: {err}")));
    }
    Ok(())
}

/// Bring `name` up (`IFF_UP`)
///
/// # Errors
/// Returns error if the interface does not exist in this namespace
pub fn set_link_up(name: &str) -> Result<()> {
    let sock = ControlSocket::open()?;
    let mut ifr = ifreq_for(name)?;

    // SAFETY: SIOCGIFFLAGS reads and writes an ifreq
    let ret = unsafe { libc::ioctl(sock.raw(), libc::SIOCGIFFLAGS as _, &mut ifr) };
    check(ret, &format!("SIOCGIFFLAGS on {name}"))?;

    // SAFETY: SIOCGIFFLAGS filled the flags member
    let flags = unsafe { ifr.ifr_ifru.ifru_flags };
    ifr.ifr_ifru.ifru_flags = flags | libc::IFF_UP as libc::c_short;

    // SAFETY: SIOCSIFFLAGS reads an ifreq
    let ret = unsafe { libc::ioctl(sock.raw(), libc::SIOCSIFFLAGS as _, &ifr) };
    check(ret, &format!("SIOCSIFFLAGS on {name}"))
}

/// Assign `cidr` to `name`, address first, then netmask
///
/// # Errors
/// Returns error if either ioctl fails
pub fn set_ipv4_address(name: &str, cidr: Ipv4Cidr) -> Result<()> {
    let sock = ControlSocket::open()?;
    let mut ifr = ifreq_for(name)?;

    ifr.ifr_ifru.ifru_addr = sockaddr(cidr.address());
    // SAFETY: SIOCSIFADDR reads an ifreq
    let ret = unsafe { libc::ioctl(sock.raw(), libc::SIOCSIFADDR as _, &ifr) };
    check(ret, &format!("SIOCSIFADDR {cidr} on {name}"))?;

    ifr.ifr_ifru.ifru_netmask = sockaddr(cidr.netmask());
    // SAFETY: SIOCSIFNETMASK reads an ifreq
    let ret = unsafe { libc::ioctl(sock.raw(), libc::SIOCSIFNETMASK as _, &ifr) };
    check(ret, &format!("SIOCSIFNETMASK {cidr} on {name}"))
}

/// Install `default via <gateway> dev <device>`
///
/// # Errors
/// Returns error if the gateway is unreachable through `device`
pub fn add_default_route(gateway: Ipv4Addr, device: &str) -> Result<()> {
    let sock = ControlSocket::open()?;
    let device = interface_cstring(device)?;

    // SAFETY: rtentry is plain old data, all-zero is a valid value
    let mut route: libc::rtentry = unsafe { std::mem::zeroed() };
    route.rt_dst = sockaddr(Ipv4Addr::UNSPECIFIED);
    route.rt_genmask = sockaddr(Ipv4Addr::UNSPECIFIED);
    route.rt_gateway = sockaddr(gateway);
    route.rt_flags = libc::RTF_UP | libc::RTF_GATEWAY;
    route.rt_dev = device.as_ptr().cast_mut();

    // SAFETY: SIOCADDRT reads an rtentry; `device` outlives the call
    let ret = unsafe { libc::ioctl(sock.raw(), libc::SIOCADDRT as _, &route) };
    check(ret, &format!("SIOCADDRT via {gateway} dev {}", device.to_string_lossy()))
}

fn interface_cstring(name: &str) -> Result<CString> {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME {
        return Err(Error::invalid_config(format!(
            "Interface name {name:?} must be 1-{MAX_INTERFACE_NAME} bytes"
        )));
    }
    CString::new(name).map_err(|e| Error::invalid_config(format!("Invalid interface name: {e}")))
}

fn ifreq_for(name: &str) -> Result<libc::ifreq> {
    let name = interface_cstring(name)?;

    // SAFETY: ifreq is plain old data, all-zero is a valid value
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    Ok(ifr)
}

fn sockaddr_in(addr: Ipv4Addr) -> libc::sockaddr_in {
    // SAFETY: sockaddr_in is plain old data, all-zero is a valid value
    let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_addr.s_addr = u32::from(addr).to_be();
    sin
}

fn sockaddr(addr: Ipv4Addr) -> libc::sockaddr {
    // SAFETY: both are 16-byte C structs; sockaddr is the generic view the
    // kernel reinterprets by family
    unsafe { std::mem::transmute::<libc::sockaddr_in, libc::sockaddr>(sockaddr_in(addr)) }
}
