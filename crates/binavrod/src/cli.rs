//! Command line arguments

use clap::Parser;

/// Convert MariaDB binlogs to Avro and serve them to CDC clients.
#[derive(Parser, Debug, Clone)]
#[command(name = "binavrod", version, about)]
pub struct Cli {
    /// Directory the replication fetcher writes binlog files into
    #[arg(long, value_name = "DIR")]
    pub binlogdir: String,

    /// Directory for Avro files, schemas and conversion state
    #[arg(long, value_name = "DIR")]
    pub avrodir: String,

    /// Root of the binlog filenames (binlog -> binlog.000001)
    #[arg(long, default_value = "binlog")]
    pub filestem: String,

    /// Sequence number of the first binlog file
    #[arg(long, default_value_t = 1)]
    pub start_index: u32,

    /// Flush Avro files after this many row records
    #[arg(long, default_value_t = binavro_core::config::DEFAULT_ROW_TARGET)]
    pub row_target: u64,

    /// Flush Avro files after this many transactions
    #[arg(long, default_value_t = binavro_core::config::DEFAULT_TRX_TARGET)]
    pub trx_target: u64,

    /// Address for the CDC client listener
    #[arg(long, default_value = "127.0.0.1:4001")]
    pub listen: String,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn converter_config(&self) -> binavro_core::ConverterConfig {
        binavro_core::ConverterConfig::new(&self.binlogdir, &self.avrodir)
            .with_filestem(&self.filestem)
            .with_start_index(self.start_index)
            .with_row_target(self.row_target)
            .with_trx_target(self.trx_target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["binavrod", "--binlogdir", "/b", "--avrodir", "/a"]);
        assert_eq!(cli.filestem, "binlog");
        assert_eq!(cli.start_index, 1);
        assert_eq!(cli.row_target, 1000);
        assert_eq!(cli.trx_target, 50);
        assert_eq!(cli.listen, "127.0.0.1:4001");
    }

    #[test]
    fn test_converter_config() {
        let cli = Cli::parse_from([
            "binavrod",
            "--binlogdir",
            "/b",
            "--avrodir",
            "/a",
            "--filestem",
            "mysql-bin",
            "--row-target",
            "10",
        ]);
        let cfg = cli.converter_config();
        assert_eq!(cfg.filestem, "mysql-bin");
        assert_eq!(cfg.row_target, 10);
        assert_eq!(cfg.binlog_file_name(3), "mysql-bin.000003");
    }
}
