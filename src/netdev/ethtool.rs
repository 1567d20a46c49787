//! Minimal `SIOCETHTOOL` client for reading driver statistics.
//!
//! Only the three commands needed for `ethtool -S` are implemented:
//! `ETHTOOL_GDRVINFO` for the stat count, `ETHTOOL_GSTRINGS` for the names
//! and `ETHTOOL_GSTATS` for the values.

use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::StatsClient;

const SIOCETHTOOL: libc::c_ulong = 0x8946;

const ETHTOOL_GDRVINFO: u32 = 0x0000_0003;
const ETHTOOL_GSTRINGS: u32 = 0x0000_001b;
const ETHTOOL_GSTATS: u32 = 0x0000_001d;

const ETH_SS_STATS: u32 = 1;
const ETH_GSTRING_LEN: usize = 32;

/// Upper bound on stats per interface; guards against a bogus count.
const MAX_STATS: usize = 64 * 1024;

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_data: *mut libc::c_void,
    _pad: [u8; 16],
}

/// `struct ethtool_drvinfo`
#[allow(dead_code)]
#[repr(C)]
struct DrvInfo {
    cmd: u32,
    driver: [u8; 32],
    version: [u8; 32],
    fw_version: [u8; 32],
    bus_info: [u8; 32],
    erom_version: [u8; 32],
    reserved2: [u8; 12],
    n_priv_flags: u32,
    n_stats: u32,
    testinfo_len: u32,
    eedump_len: u32,
    regdump_len: u32,
}

/// Ethtool client bound to an `AF_INET` datagram socket.
#[derive(Debug)]
pub struct EthtoolClient {
    fd: Option<OwnedFd>,
}

impl EthtoolClient {
    pub fn open() -> io::Result<Self> {
        // SAFETY: plain socket(2) call; the returned descriptor is owned below.
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd is a freshly created, valid descriptor not owned elsewhere.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd: Some(fd) })
    }

    fn ioctl(&self, netdev: &str, data: *mut libc::c_void) -> io::Result<()> {
        let fd = self
            .fd
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "ethtool socket closed"))?;

        let mut req = IfReq {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_data: data,
            _pad: [0; 16],
        };
        let name = netdev.as_bytes();
        if name.is_empty() || name.len() >= libc::IFNAMSIZ || name.contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid interface name {netdev:?}"),
            ));
        }
        for (dst, src) in req.ifr_name.iter_mut().zip(name) {
            *dst = *src as libc::c_char;
        }

        // SAFETY: req is a properly initialized ifreq whose data pointer
        // refers to a live, correctly sized ethtool command buffer.
        let rc = unsafe { libc::ioctl(fd.as_raw_fd(), SIOCETHTOOL as _, &mut req as *mut IfReq) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn stat_count(&self, netdev: &str) -> io::Result<usize> {
        // SAFETY: DrvInfo is plain old data; all-zero is a valid value.
        let mut info: DrvInfo = unsafe { mem::zeroed() };
        info.cmd = ETHTOOL_GDRVINFO;
        self.ioctl(netdev, &mut info as *mut DrvInfo as *mut libc::c_void)?;

        let count = info.n_stats as usize;
        if count > MAX_STATS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("driver reports {count} stats"),
            ));
        }
        Ok(count)
    }

    fn stat_names(&self, netdev: &str, count: usize) -> io::Result<Vec<String>> {
        // Header is cmd, string_set, len (3 x u32) followed by the strings.
        // A u64 buffer keeps the header aligned.
        let header = 3 * mem::size_of::<u32>();
        let bytes = header + count * ETH_GSTRING_LEN;
        let mut buf = vec![0u64; bytes.div_ceil(mem::size_of::<u64>())];
        let ptr = buf.as_mut_ptr() as *mut u32;
        // SAFETY: buf holds at least three u32 words.
        unsafe {
            *ptr = ETHTOOL_GSTRINGS;
            *ptr.add(1) = ETH_SS_STATS;
            *ptr.add(2) = count as u32;
        }
        self.ioctl(netdev, buf.as_mut_ptr() as *mut libc::c_void)?;

        // SAFETY: buf is `bytes` long and fully initialized.
        let raw = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, bytes) };
        let returned = u32::from_ne_bytes([raw[8], raw[9], raw[10], raw[11]]) as usize;

        Ok(raw[header..]
            .chunks_exact(ETH_GSTRING_LEN)
            .take(returned.min(count))
            .map(|chunk| {
                let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                String::from_utf8_lossy(&chunk[..end]).into_owned()
            })
            .collect())
    }

    fn stat_values(&self, netdev: &str, count: usize) -> io::Result<Vec<u64>> {
        // Header is cmd, n_stats (2 x u32), exactly one u64 slot.
        let mut buf = vec![0u64; 1 + count];
        let ptr = buf.as_mut_ptr() as *mut u32;
        // SAFETY: buf[0] spans the two header words.
        unsafe {
            *ptr = ETHTOOL_GSTATS;
            *ptr.add(1) = count as u32;
        }
        self.ioctl(netdev, buf.as_mut_ptr() as *mut libc::c_void)?;

        // SAFETY: buf[0] holds the header written back by the kernel.
        let returned = unsafe { *ptr.add(1) } as usize;
        Ok(buf[1..1 + returned.min(count)].to_vec())
    }
}

impl StatsClient for EthtoolClient {
    fn stats(&mut self, netdev: &str) -> io::Result<BTreeMap<String, u64>> {
        let count = self.stat_count(netdev)?;
        if count == 0 {
            return Ok(BTreeMap::new());
        }

        let names = self.stat_names(netdev, count)?;
        let values = self.stat_values(netdev, count)?;
        Ok(names.into_iter().zip(values).collect())
    }

    fn close(&mut self) {
        self.fd = None;
    }
}
