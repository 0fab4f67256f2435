// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The whole database path: clients talk to the router, which shares the work between a pool of
//! oracles all backed by the same store.

use db_rpc_client::DbClient;
use db_rpc_common::{
    BuildRecord, DbRequest, DownloadRecord, FileRecord, Request, RpcError, Value,
};
use farm_oracle::{Database, MemoryDatabase, MemoryStore, Oracle, Router, STATISTICS_FIELDS};
use farm_task::RunningTask;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, SystemTime};

const DB_QUEUE: &str = "inproc://db-queue";
const ORACLE_QUEUE: &str = "inproc://oracle";

struct Farm {
    ctx: zmq::Context,
    store: MemoryStore,
    router: RunningTask<Router>,
    oracles: Vec<RunningTask<Oracle<MemoryDatabase>>>,
}

impl Farm {
    fn start(oracles: usize) -> Self {
        let ctx = zmq::Context::new();
        let store = MemoryStore::new(vec!["cp34m".to_string(), "cp35m".to_string()]);
        let router = Router::new(ctx.clone(), DB_QUEUE, ORACLE_QUEUE)
            .unwrap()
            .spawn()
            .unwrap();
        let oracles = (0..oracles)
            .map(|_| {
                Oracle::new(ctx.clone(), ORACLE_QUEUE, store.connect())
                    .unwrap()
                    .spawn()
                    .unwrap()
            })
            .collect();
        Self {
            ctx,
            store,
            router,
            oracles,
        }
    }

    fn client(&self) -> DbClient {
        DbClient::new(self.ctx.clone(), DB_QUEUE).unwrap()
    }

    fn stop(self) {
        for oracle in &self.oracles {
            oracle.request_stop().unwrap();
        }
        self.router.request_stop().unwrap();
        for oracle in self.oracles {
            oracle.join().unwrap();
        }
        self.router.join().unwrap();
    }
}

fn wheel(package: &str, version: &str) -> FileRecord {
    FileRecord {
        filename: format!("{package}-{version}-cp35-cp35m-linux_armv7l.whl"),
        filesize: 123456,
        filehash: "c3bef91a".to_string(),
        package_tag: package.to_string(),
        package_version_tag: version.to_string(),
        py_version_tag: "cp35".to_string(),
        abi_tag: "cp35m".to_string(),
        platform_tag: "linux_armv7l".to_string(),
    }
}

#[test]
fn test_new_package_is_reported_once() {
    let farm = Farm::start(2);
    let mut client = farm.client();
    assert!(client.add_new_package("foo").unwrap());
    assert!(!client.add_new_package("foo").unwrap());
    assert_eq!(
        client.get_all_packages().unwrap(),
        BTreeSet::from(["foo".to_string()])
    );
    drop(client);
    farm.stop();
}

#[test]
fn test_package_exists_after_new_version() {
    let farm = Farm::start(2);
    let mut client = farm.client();
    client.add_new_package("foo").unwrap();
    assert!(!client.test_package_version("foo", "0.1").unwrap());
    assert!(client.add_new_package_version("foo", "0.1").unwrap());
    assert!(client.test_package_version("foo", "0.1").unwrap());
    assert_eq!(
        client.get_all_package_versions().unwrap(),
        BTreeSet::from([("foo".to_string(), "0.1".to_string())])
    );
    drop(client);
    farm.stop();
}

#[test]
fn test_every_command_round_trips() {
    let farm = Farm::start(3);
    let mut client = farm.client();

    client.add_new_package("foo").unwrap();
    client.add_new_package_version("foo", "0.1").unwrap();

    let mut build = BuildRecord::new(1, "foo", "0.1", "cp35m");
    build.status = true;
    build.duration = Duration::from_secs(5);
    build.output = "Built wheel".to_string();
    build.files = vec![wheel("foo", "0.1")];
    client.log_build(&mut build).unwrap();
    assert_eq!(build.build_id, Some(1));
    assert_eq!(client.get_package_files("foo").unwrap(), vec![wheel("foo", "0.1")]);
    assert_eq!(client.get_package_files("bar").unwrap(), vec![]);

    let mut download = DownloadRecord::new(
        wheel("foo", "0.1").filename,
        "192.168.0.2",
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000),
    );
    download.arch = Some("armv7l".to_string());
    client.log_download(&download).unwrap();

    assert_eq!(
        client.get_build_abis().unwrap(),
        vec!["cp34m".to_string(), "cp35m".to_string()]
    );

    assert_eq!(client.get_pypi_serial().unwrap(), 0);
    client.set_pypi_serial(1_000_000).unwrap();
    assert_eq!(client.get_pypi_serial().unwrap(), 1_000_000);

    let stats = client.get_statistics().unwrap();
    assert_eq!(stats.shape().fields(), STATISTICS_FIELDS.map(String::from));
    assert_eq!(stats.get_int("packages_count"), Some(1));
    assert_eq!(stats.get_int("versions_count"), Some(1));
    assert_eq!(stats.get_int("builds_count"), Some(1));
    assert_eq!(stats.get_int("builds_success"), Some(1));
    assert_eq!(stats.get_int("files_count"), Some(1));
    assert_eq!(stats.get_int("downloads_count"), Some(1));
    assert_eq!(stats.get_int("pypi_serial"), Some(1_000_000));

    drop(client);
    farm.stop();
}

#[test]
fn test_statistics_share_one_shape() {
    let farm = Farm::start(2);
    let mut client = farm.client();
    let first = client.get_statistics().unwrap();
    client.add_new_package("foo").unwrap();
    let second = client.get_statistics().unwrap();

    assert!(first.shape().shares_storage_with(second.shape()));
    assert_eq!(first.get_int("packages_count"), Some(0));
    assert_eq!(second.get_int("packages_count"), Some(1));
    drop(client);
    farm.stop();
}

#[test]
fn test_failed_build_log_leaves_farm_serving() {
    let farm = Farm::start(1);
    let mut client = farm.client();

    let mut build = BuildRecord::new(1, "foo", "0.1", "cp35m");
    let err = client.log_build(&mut build).unwrap_err();
    assert_eq!(
        err,
        RpcError::Failed("unknown version 0.1 of package foo".to_string())
    );
    assert!(!build.is_logged());

    assert!(client.add_new_package("foo").unwrap());
    drop(client);
    farm.stop();
}

#[test]
fn test_download_of_unknown_file_is_refused() {
    let farm = Farm::start(1);
    let mut client = farm.client();
    let download = DownloadRecord::new(
        "nopkg-9.9-py3-none-any.whl",
        "192.168.0.2",
        SystemTime::UNIX_EPOCH,
    );
    assert_eq!(
        client.log_download(&download),
        Err(RpcError::Failed(
            "unknown file nopkg-9.9-py3-none-any.whl".to_string()
        ))
    );
    let stats = client.get_statistics().unwrap();
    assert_eq!(stats.get_int("downloads_count"), Some(0));
    drop(client);
    farm.stop();
}

#[test]
fn test_unknown_command_is_refused() {
    let farm = Farm::start(1);
    let mut client = farm.client();
    let err = client
        .execute_raw(Request::new("FROBNICATE", vec![]))
        .unwrap_err();
    assert!(matches!(err, RpcError::Failed(_)));
    assert_eq!(client.execute(DbRequest::GetPypiSerial).unwrap(), Value::Int(0));
    drop(client);
    farm.stop();
}

#[test]
fn test_concurrent_clients() {
    let farm = Farm::start(3);
    let workers: Vec<_> = (0..4)
        .map(|n| {
            let mut client = farm.client();
            thread::spawn(move || {
                let package = format!("pkg{n}");
                assert!(client.add_new_package(&package).unwrap());
                (0..5)
                    .map(|version| {
                        let version = format!("0.{version}");
                        client.add_new_package_version(&package, &version).unwrap();
                        let mut build = BuildRecord::new(n, package.clone(), version, "cp35m");
                        client.log_build(&mut build).unwrap();
                        build.build_id.unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let ids: BTreeSet<i64> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();
    assert_eq!(ids, (1..=20).collect());

    let mut db = farm.store.connect();
    assert_eq!(db.get_all_packages().unwrap().len(), 4);
    assert_eq!(db.get_all_package_versions().unwrap().len(), 20);
    farm.stop();
}

#[test]
fn test_stop_with_no_clients() {
    let farm = Farm::start(2);
    thread::sleep(Duration::from_millis(50));
    assert!(!farm.router.is_finished());
    farm.stop();
}
