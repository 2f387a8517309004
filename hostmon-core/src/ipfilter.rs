use std::net::IpAddr;

/// Returns true when `address` is exempt from alerting.
///
/// Exclusion entries containing `/` are treated as CIDR ranges (host bits
/// set in the network part are tolerated); anything else matches only on
/// exact equality. An empty or unparseable address is treated as excluded:
/// suppressing a garbage positive beats alerting on one.
pub fn is_excluded(address: &str, exclusions: &[String]) -> bool {
    let address = address.trim();
    if address.is_empty() {
        return true;
    }
    let ip: IpAddr = match address.parse() {
        Ok(ip) => ip,
        Err(_) => return true,
    };

    exclusions.iter().any(|entry| {
        if let Some((network, prefix)) = entry.split_once('/') {
            range_contains(network, prefix, ip)
        } else {
            entry == address
        }
    })
}

fn range_contains(network: &str, prefix: &str, ip: IpAddr) -> bool {
    let Ok(prefix) = prefix.parse::<u32>() else {
        return false;
    };
    match (network.parse::<IpAddr>(), ip) {
        (Ok(IpAddr::V4(net)), IpAddr::V4(ip)) => {
            if prefix > 32 {
                return false;
            }
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (Ok(IpAddr::V6(net)), IpAddr::V6(ip)) => {
            if prefix > 128 {
                return false;
            }
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}
