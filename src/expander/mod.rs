//! Address expansion
//!
//! Turns the lines of an input file (`host`, `host:port`, `cidr`,
//! `cidr:port`, plus bracketed or bare IPv6 forms) into a flat list of
//! [`Endpoint`]s. Output follows file order, and addresses inside a block
//! ascend from the network address through the broadcast address. Nothing is
//! deduplicated. Malformed lines are reported in [`Expansion::skipped`] and
//! never abort the run.

use crate::error::{AppError, ErrorContext, Result};
use crate::models::Endpoint;
use ipnet::IpNet;
use rand::seq::SliceRandom;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// A line that produced no endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line_number: usize,
    pub content: String,
    pub reason: String,
}

/// Result of expanding an input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub endpoints: Vec<Endpoint>,
    pub skipped: Vec<SkippedLine>,
}

/// Expands address specifications into endpoints
#[derive(Debug, Clone)]
pub struct AddressExpander {
    default_port: u16,
    max_block_addresses: u128,
}

enum HostSpec {
    Single(IpAddr),
    Block(IpNet),
}

impl AddressExpander {
    pub fn new(default_port: u16) -> Self {
        Self {
            default_port,
            max_block_addresses: crate::defaults::MAX_BLOCK_ADDRESSES,
        }
    }

    /// Override the largest block that will be enumerated
    pub fn with_max_block_addresses(mut self, max: u128) -> Self {
        self.max_block_addresses = max;
        self
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Read and expand a file; failing to read it is fatal
    pub fn expand_file<P: AsRef<Path>>(&self, path: P) -> Result<Expansion> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read address file {}", path.display()))?;
        Ok(self.expand_lines(content.lines()))
    }

    /// Expand every line in order
    pub fn expand_lines<'a, I>(&self, lines: I) -> Expansion
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut expansion = Expansion::default();

        for (index, raw) in lines.into_iter().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Err(e) = self.expand_line_into(line, &mut expansion.endpoints) {
                expansion.skipped.push(SkippedLine {
                    line_number: index + 1,
                    content: line.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        expansion
    }

    /// Expand a single specification
    pub fn expand_line(&self, line: &str) -> Result<Vec<Endpoint>> {
        let mut out = Vec::new();
        self.expand_line_into(line.trim(), &mut out)?;
        Ok(out)
    }

    fn expand_line_into(&self, line: &str, out: &mut Vec<Endpoint>) -> Result<()> {
        let (host, port) = self.split_host_port(line);

        match parse_host(host)? {
            HostSpec::Single(address) => out.push(Endpoint::new(address, port)),
            HostSpec::Block(net) => {
                let size = block_size(&net);
                if size.map_or(true, |n| n > self.max_block_addresses) {
                    return Err(AppError::validation(format!(
                        "block {} is larger than {} addresses",
                        net, self.max_block_addresses
                    )));
                }
                let count = size.unwrap_or(0) as usize;
                out.reserve(count);
                let mut address = net.network();
                for i in 0..count {
                    out.push(Endpoint::new(address, port));
                    if i + 1 < count {
                        address = next_address(address);
                    }
                }
            }
        }

        Ok(())
    }

    /// Split `host[:port]`, falling back to the default port when the
    /// port is absent or unparsable
    fn split_host_port<'a>(&self, line: &'a str) -> (&'a str, u16) {
        if let Some(rest) = line.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').map_or(self.default_port, |p| self.port_or_default(p));
                return (host, port);
            }
            return (line, self.default_port);
        }

        match line.matches(':').count() {
            0 => (line, self.default_port),
            1 => match line.rsplit_once(':') {
                Some((host, port)) => (host, self.port_or_default(port)),
                None => (line, self.default_port),
            },
            // Bare IPv6 literal or block
            _ => (line, self.default_port),
        }
    }

    fn port_or_default(&self, raw: &str) -> u16 {
        match raw.trim().parse::<u16>() {
            Ok(0) | Err(_) => self.default_port,
            Ok(port) => port,
        }
    }
}

/// Uniform in-place shuffle
pub fn shuffle(endpoints: &mut [Endpoint]) {
    shuffle_with(endpoints, &mut rand::thread_rng());
}

pub fn shuffle_with<R: Rng + ?Sized>(endpoints: &mut [Endpoint], rng: &mut R) {
    endpoints.shuffle(rng);
}

fn parse_host(host: &str) -> Result<HostSpec> {
    if host.contains('/') {
        let net: IpNet = host
            .parse()
            .map_err(|e| AppError::parse(format!("malformed CIDR '{}': {}", host, e)))?;
        Ok(HostSpec::Block(net))
    } else {
        let address: IpAddr = host
            .parse()
            .map_err(|_| AppError::parse(format!("'{}' is not an IP address", host)))?;
        Ok(HostSpec::Single(address))
    }
}

/// Number of addresses in the block, `None` when it does not fit in u128
fn block_size(net: &IpNet) -> Option<u128> {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(host_bits)
}

/// Big-endian increment with carry
fn next_address(address: IpAddr) -> IpAddr {
    fn increment(bytes: &mut [u8]) {
        for byte in bytes.iter_mut().rev() {
            let (value, overflow) = byte.overflowing_add(1);
            *byte = value;
            if !overflow {
                break;
            }
        }
    }

    match address {
        IpAddr::V4(v4) => {
            let mut octets = v4.octets();
            increment(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        IpAddr::V6(v6) => {
            let mut octets = v6.octets();
            increment(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> Endpoint {
        let addr: std::net::SocketAddr = s.parse().unwrap();
        Endpoint::from(addr)
    }

    #[test]
    fn test_slash_30_includes_network_and_broadcast() {
        let expander = AddressExpander::new(443);
        let endpoints = expander.expand_line("1.1.1.0/30").unwrap();
        assert_eq!(
            endpoints,
            vec![ep("1.1.1.0:443"), ep("1.1.1.1:443"), ep("1.1.1.2:443"), ep("1.1.1.3:443")]
        );
    }

    #[test]
    fn test_explicit_port() {
        let expander = AddressExpander::new(443);
        assert_eq!(expander.expand_line("8.8.8.8:8443").unwrap(), vec![ep("8.8.8.8:8443")]);
        assert_eq!(expander.expand_line("8.8.8.8").unwrap(), vec![ep("8.8.8.8:443")]);
    }

    #[test]
    fn test_cidr_with_port() {
        let expander = AddressExpander::new(443);
        let endpoints = expander.expand_line("10.0.0.0/31:2053").unwrap();
        assert_eq!(endpoints, vec![ep("10.0.0.0:2053"), ep("10.0.0.1:2053")]);
    }

    #[test]
    fn test_host_bits_are_masked() {
        let expander = AddressExpander::new(80);
        let endpoints = expander.expand_line("1.1.1.5/30").unwrap();
        assert_eq!(endpoints.first(), Some(&ep("1.1.1.4:80")));
        assert_eq!(endpoints.last(), Some(&ep("1.1.1.7:80")));
    }

    #[test]
    fn test_carry_across_octets() {
        let expander = AddressExpander::new(443);
        let endpoints = expander.expand_line("10.0.0.0/23").unwrap();
        assert_eq!(endpoints.len(), 512);
        assert_eq!(endpoints[255], ep("10.0.0.255:443"));
        assert_eq!(endpoints[256], ep("10.0.1.0:443"));
    }

    #[test]
    fn test_unparsable_port_falls_back() {
        let expander = AddressExpander::new(443);
        assert_eq!(expander.expand_line("8.8.8.8:http").unwrap(), vec![ep("8.8.8.8:443")]);
        assert_eq!(expander.expand_line("8.8.8.8:").unwrap(), vec![ep("8.8.8.8:443")]);
        assert_eq!(expander.expand_line("8.8.8.8:99999").unwrap(), vec![ep("8.8.8.8:443")]);
    }

    #[test]
    fn test_ipv6_forms() {
        let expander = AddressExpander::new(443);
        assert_eq!(expander.expand_line("2606:4700::1").unwrap(), vec![ep("[2606:4700::1]:443")]);
        assert_eq!(expander.expand_line("[2606:4700::1]:8443").unwrap(), vec![ep("[2606:4700::1]:8443")]);

        let block = expander.expand_line("2606:4700::/126").unwrap();
        assert_eq!(block.len(), 4);
        assert_eq!(block[3], ep("[2606:4700::3]:443"));

        let bracketed = expander.expand_line("[2606:4700::/127]:2096").unwrap();
        assert_eq!(bracketed, vec![ep("[2606:4700::]:2096"), ep("[2606:4700::1]:2096")]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let expander = AddressExpander::new(443);
        let input = "1.1.1.1\n1.1.1.0/33\n\n# comment\nexample.com\n2.2.2.2:8080\n";
        let expansion = expander.expand_lines(input.lines());

        assert_eq!(expansion.endpoints, vec![ep("1.1.1.1:443"), ep("2.2.2.2:8080")]);
        assert_eq!(expansion.skipped.len(), 2);
        assert_eq!(expansion.skipped[0].line_number, 2);
        assert!(expansion.skipped[0].reason.contains("malformed CIDR"));
        assert_eq!(expansion.skipped[1].content, "example.com");
    }

    #[test]
    fn test_oversize_block_is_skipped() {
        let expander = AddressExpander::new(443).with_max_block_addresses(256);
        let expansion = expander.expand_lines(["10.0.0.0/23", "10.0.0.0/24"]);
        assert_eq!(expansion.endpoints.len(), 256);
        assert_eq!(expansion.skipped.len(), 1);

        let whole_v6 = AddressExpander::new(443).expand_lines(["::/0"]);
        assert!(whole_v6.endpoints.is_empty());
        assert_eq!(whole_v6.skipped.len(), 1);
    }

    #[test]
    fn test_no_deduplication() {
        let expander = AddressExpander::new(443);
        let expansion = expander.expand_lines(["1.1.1.1", "1.1.1.1", "1.1.1.0/31"]);
        assert_eq!(expansion.endpoints.len(), 4);
        assert_eq!(expansion.endpoints[0], expansion.endpoints[1]);
    }

    #[test]
    fn test_expand_file_missing_is_fatal() {
        let expander = AddressExpander::new(443);
        let err = expander.expand_file("/definitely/not/here/ip.txt").unwrap_err();
        assert_eq!(err.category(), "IO");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_expand_file_reads_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ip.txt");
        std::fs::write(&path, "1.0.0.0/31\r\n9.9.9.9:853\n").unwrap();

        let expansion = AddressExpander::new(443).expand_file(&path).unwrap();
        assert_eq!(expansion.endpoints, vec![ep("1.0.0.0:443"), ep("1.0.0.1:443"), ep("9.9.9.9:853")]);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        use rand::SeedableRng;

        let expander = AddressExpander::new(443);
        let original = expander.expand_line("10.0.0.0/28").unwrap();
        let mut shuffled = original.clone();
        shuffle_with(&mut shuffled, &mut rand::rngs::StdRng::seed_from_u64(7));

        let mut sorted = shuffled.clone();
        sorted.sort_by_key(|e| e.address);
        assert_eq!(sorted, original);
    }
}
