use anyhow::{ensure, Context, Result};
use model::timelocks::Durations;
use primitive_types::{H160, U256};
use std::{fmt, time::Duration};
use url::Url;

#[derive(clap::Parser)]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,resolver=debug")]
    pub log_filter: String,

    /// Base url of the relayer's coordination api.
    #[clap(long, env, default_value = "http://localhost:8080")]
    pub relayer_url: Url,

    /// Chain ids to run in process simulated chains for.
    #[clap(long, env, default_value = "1,137", use_value_delimiter = true)]
    pub sim_chains: Vec<u64>,

    /// How often to look for new orders and to poll auctions whose price is
    /// still far from our threshold.
    #[clap(
        long,
        env,
        default_value = "5s",
        value_parser = humantime::parse_duration,
    )]
    pub poll_interval: Duration,

    /// Polling cadence once a price approaches the threshold and while
    /// waiting for the secret to appear on chain.
    #[clap(
        long,
        env,
        default_value = "2s",
        value_parser = humantime::parse_duration,
    )]
    pub fast_poll_interval: Duration,

    /// Fair value of one maker asset unit in taker asset units, in 18
    /// decimal fixed point. The default is 1.
    #[clap(
        long,
        env,
        default_value = "1000000000000000000",
        value_parser = U256::from_dec_str,
    )]
    pub reference_price: U256,

    /// Minimum profit margin below the reference price, in basis points.
    #[clap(long, env, default_value = "50")]
    pub min_profit_bps: u32,

    /// Largest share of an order's remaining capacity taken per commitment,
    /// in basis points.
    #[clap(long, env, default_value = "10000")]
    pub max_fill_bps: u32,

    /// Native safety deposit required per whole unit of maker asset, in
    /// 18 decimal fixed point. Must match the relayer's setting or escrow
    /// verification fails.
    #[clap(
        long,
        env,
        default_value = "10000000000000000",
        value_parser = U256::from_dec_str,
    )]
    pub per_unit_safety_deposit: U256,

    /// Address the resolver acts under on every chain.
    #[clap(long, env)]
    pub resolver_address: H160,

    /// The seven timelock stage offsets in seconds: src withdrawal, src
    /// public withdrawal, src cancellation, src public cancellation, dst
    /// withdrawal, dst public withdrawal, dst cancellation.
    #[clap(
        long,
        env,
        default_value = "0,900,1800,3600,0,900,2700",
        use_value_delimiter = true
    )]
    pub timelock_durations: Vec<u32>,

    #[clap(long, env, default_value = "9587")]
    pub metrics_port: u16,
}

impl Arguments {
    /// The timelock schedule stamped into every escrow this resolver
    /// deploys.
    pub fn durations(&self) -> Result<Durations> {
        let offsets: [u32; 7] = self
            .timelock_durations
            .as_slice()
            .try_into()
            .ok()
            .with_context(|| {
                format!(
                    "expected seven timelock offsets, got {}",
                    self.timelock_durations.len()
                )
            })?;
        let durations = Durations::from_array(offsets);
        ensure!(
            durations.is_ordered(),
            "timelock stages are not in chronological order"
        );
        Ok(durations)
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "log_filter: {}", self.log_filter)?;
        writeln!(f, "relayer_url: {}", self.relayer_url)?;
        writeln!(f, "sim_chains: {:?}", self.sim_chains)?;
        writeln!(f, "poll_interval: {:?}", self.poll_interval)?;
        writeln!(f, "fast_poll_interval: {:?}", self.fast_poll_interval)?;
        writeln!(f, "reference_price: {}", self.reference_price)?;
        writeln!(f, "min_profit_bps: {}", self.min_profit_bps)?;
        writeln!(f, "max_fill_bps: {}", self.max_fill_bps)?;
        writeln!(f, "per_unit_safety_deposit: {}", self.per_unit_safety_deposit)?;
        writeln!(f, "resolver_address: {:?}", self.resolver_address)?;
        writeln!(f, "timelock_durations: {:?}", self.timelock_durations)?;
        writeln!(f, "metrics_port: {}", self.metrics_port)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Arguments {
        let mut argv = vec![
            "resolver",
            "--resolver-address",
            "0x0000000000000000000000000000000000000051",
        ];
        argv.extend_from_slice(extra);
        Arguments::parse_from(argv)
    }

    #[test]
    fn parses_defaults() {
        let args = parse(&[]);
        assert_eq!(args.relayer_url.as_str(), "http://localhost:8080/");
        assert_eq!(args.sim_chains, vec![1, 137]);
        assert_eq!(args.poll_interval, Duration::from_secs(5));
        assert_eq!(args.min_profit_bps, 50);
        assert_eq!(args.durations().unwrap(), Durations::default());
    }

    #[test]
    fn rejects_bad_timelock_schedules() {
        let missing = parse(&["--timelock-durations", "0,900,1800"]);
        assert!(missing.durations().is_err());
        let unordered = parse(&["--timelock-durations", "900,0,1800,3600,0,900,2700"]);
        assert!(unordered.durations().is_err());
    }
}
