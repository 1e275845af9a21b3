#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate pretty_env_logger;
extern crate getopts;

extern crate futures;
extern crate tokio_core;

extern crate gregor;

use std::env;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::process;

use getopts::Options;

use futures::{Future, future};
use tokio_core::reactor::Core;

use gregor::{Consumer, ConsumerBuilder, ConsumerRecord, InMemoryStore, StringDeserializer,
             Verdict};

const DEFAULT_BROKER: &str = "127.0.0.1:9092";
const DEFAULT_CLIENT_ID: &str = "console-consumer";
const DEFAULT_TOPIC: &str = "my-topic";
const DEFAULT_GROUP: &str = "console";

error_chain! {
    links {
        KafkaError(gregor::Error, gregor::ErrorKind);
    }
    foreign_links {
        IoError(::std::io::Error);
        ArgError(::getopts::Fail);
    }
}

#[derive(Clone, Debug)]
struct Config {
    brokers: Vec<String>,
    client_id: String,
    topic: String,
    group_id: String,
}

impl Config {
    fn parse_cmdline() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        let program = Path::new(&args[0])
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("console-consumer");
        let mut opts = Options::new();

        opts.optflag("h", "help", "print this help menu");
        opts.optopt("b",
                    "bootstrap-server",
                    "Bootstrap broker(s) (host[:port], comma separated)",
                    "HOSTS");
        opts.optopt("", "client-id", "Specify the client id.", "ID");
        opts.optopt("g", "group-id", "Specify the consumer group.", "NAME");
        opts.optopt("t", "topic", "Specify the topic.", "NAME");

        let m = opts.parse(&args[1..])?;

        if m.opt_present("h") {
            let brief = format!("Usage: {} [options]", program);

            print!("{}", opts.usage(&brief));

            process::exit(0);
        }

        let brokers = m.opt_str("b")
            .map_or_else(|| vec![DEFAULT_BROKER.to_owned()],
                         |s| s.split(',').map(|s| s.trim().to_owned()).collect());

        Ok(Config {
               brokers: brokers,
               client_id: m.opt_str("client-id")
                   .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_owned()),
               topic: m.opt_str("t").unwrap_or_else(|| DEFAULT_TOPIC.to_owned()),
               group_id: m.opt_str("g").unwrap_or_else(|| DEFAULT_GROUP.to_owned()),
           })
    }
}

fn main() {
    pretty_env_logger::init();

    let config = Config::parse_cmdline().unwrap();

    debug!("parsed config: {:?}", config);

    run(config).unwrap();
}

fn run(config: Config) -> Result<()> {
    let mut core = Core::new()?;
    let handle = core.handle();

    let hosts = config
        .brokers
        .iter()
        .flat_map(|s| s.to_socket_addrs().unwrap());

    let consumer = ConsumerBuilder::<InMemoryStore>::with_bootstrap_servers(hosts, handle)
        .with_client_id(config.client_id)
        .with_group_id(config.group_id)
        .with_topic(config.topic)
        .with_coordination_store(InMemoryStore::new())
        .with_key_deserializer(StringDeserializer::default())
        .with_value_deserializer(StringDeserializer::default())
        .with_handler(|record: ConsumerRecord<String, String>| {
                          println!("{}#{} @ {}: {:?} => {:?}",
                                   record.topic_name,
                                   record.partition,
                                   record.offset,
                                   record.key,
                                   record.value);

                          Verdict::Ack
                      })
        .build()?;

    core.run(consumer.start().map_err(Error::from))?;

    info!("consumer `{}` joined, waiting for records", consumer.member_id());

    core.run(future::empty::<(), Error>())
}
