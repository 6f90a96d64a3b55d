use primitive_types::{H160, U256};
use std::{fmt, net::SocketAddr, time::Duration};
use url::Url;

#[derive(clap::Parser)]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,relayer=debug")]
    pub log_filter: String,

    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub bind_address: SocketAddr,

    /// Url of the Postgres database. By default connects to locally running
    /// postgres. Only used with the postgres storage backend.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// Where order, commitment and secret state lives.
    #[clap(long, env, default_value = "postgres")]
    pub storage: StorageBackend,

    /// Chain ids to run in process simulated chains for.
    #[clap(long, env, default_value = "1,137", use_value_delimiter = true)]
    pub sim_chains: Vec<u64>,

    /// How long a resolver has between committing to an order and proving
    /// its escrows before the commitment is slashed.
    #[clap(
        long,
        env,
        default_value = "5m",
        value_parser = humantime::parse_duration,
    )]
    pub commitment_deadline: Duration,

    /// How often the timeout sweeper looks for slashable commitments and
    /// expired orders.
    #[clap(
        long,
        env,
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub sweep_interval: Duration,

    /// Native safety deposit required per whole unit of maker asset, in
    /// 18 decimal fixed point. The default is 0.01.
    #[clap(
        long,
        env,
        default_value = "10000000000000000",
        value_parser = U256::from_dec_str,
    )]
    pub per_unit_safety_deposit: U256,

    /// Settlement contract address baked into the order signing domain.
    #[clap(long, env)]
    pub verifying_contract: H160,

    /// Address the relayer acts under when it touches escrows.
    #[clap(long, env)]
    pub relayer_address: H160,

    /// Port the metrics and liveness endpoints bind to.
    #[clap(long, env, default_value_t = observe::metrics::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "log_filter: {}", self.log_filter)?;
        writeln!(f, "bind_address: {}", self.bind_address)?;
        writeln!(f, "db_url: SECRET")?;
        writeln!(f, "storage: {:?}", self.storage)?;
        writeln!(f, "sim_chains: {:?}", self.sim_chains)?;
        writeln!(f, "commitment_deadline: {:?}", self.commitment_deadline)?;
        writeln!(f, "sweep_interval: {:?}", self.sweep_interval)?;
        writeln!(f, "per_unit_safety_deposit: {}", self.per_unit_safety_deposit)?;
        writeln!(f, "verifying_contract: {:?}", self.verifying_contract)?;
        writeln!(f, "relayer_address: {:?}", self.relayer_address)?;
        writeln!(f, "metrics_port: {}", self.metrics_port)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_defaults() {
        let args = Arguments::parse_from([
            "relayer",
            "--verifying-contract",
            "0x9008d19f58aabd9ed0d60971565aa8510560ab41",
            "--relayer-address",
            "0x0000000000000000000000000000000000000099",
        ]);
        assert_eq!(args.bind_address.port(), 8080);
        assert_eq!(args.sim_chains, vec![1, 137]);
        assert_eq!(args.commitment_deadline, Duration::from_secs(300));
        assert_eq!(args.per_unit_safety_deposit, U256::exp10(16));
        assert!(matches!(args.storage, StorageBackend::Postgres));
        assert_eq!(args.metrics_port, observe::metrics::DEFAULT_METRICS_PORT);
    }
}
