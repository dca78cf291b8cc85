use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use env_logger::Builder;
use log::info;
use rand::prelude::*;
use rand_pcg::Pcg64;

use dslab_core::simulation::Simulation;

use dslab_cloudlets::config::SimulationConfig;
use dslab_cloudlets::data::DataItem;
use dslab_cloudlets::id::{DiskId, VmId};
use dslab_cloudlets::task::Task;
use dslab_cloudlets::CloudSimulation;

/// Runs a datacenter with VMs executing tasks which read data from host disks
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to JSON file with simulation config
    #[clap(long)]
    config: Option<String>,

    /// Number of hosts (>= 1)
    #[clap(long, default_value_t = 2)]
    host_count: u32,

    /// Number of VMs per host
    #[clap(long, default_value_t = 2)]
    vms_per_host: u32,

    /// Number of tasks
    #[clap(long, default_value_t = 100)]
    task_count: u32,

    /// Time of the VM migration from the first host to the last one (no migration if absent)
    #[clap(long)]
    migrate_at: Option<f64>,

    /// Random seed
    #[clap(long, default_value_t = 123)]
    seed: u64,
}

fn read_config(path: &Option<String>) -> SimulationConfig {
    match path {
        Some(path) => {
            let data = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Can't read file {}: {}", path, e));
            SimulationConfig::from_json(&data).unwrap_or_else(|e| panic!("Can't parse config {}: {}", path, e))
        }
        None => SimulationConfig::default(),
    }
}

fn main() {
    let args = Args::parse();

    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let mut rand = Pcg64::seed_from_u64(args.seed);
    let mut sim = CloudSimulation::new(Simulation::new(args.seed), read_config(&args.config));

    // Each host has 4 processing elements and 2 disks
    let mut all_disks: Vec<DiskId> = Vec::new();
    let mut hosts = Vec::new();
    for i in 0..args.host_count {
        let host = sim.add_host(&format!("host{}", i), &[1000.; 4], &[200., 100.]);
        all_disks.extend(sim.host(host).unwrap().borrow().disk_ids());
        hosts.push(host);
    }

    // Every data item is replicated on two random disks
    let items: Vec<Rc<DataItem>> = (0..10)
        .map(|_| {
            let disks: Vec<DiskId> = all_disks.choose_multiple(&mut rand, 2).copied().collect();
            sim.create_data_item(rand.gen_range(100..=1000), &disks).unwrap()
        })
        .collect();

    let mut vms: Vec<VmId> = Vec::new();
    for host in hosts.iter() {
        for _ in 0..args.vms_per_host {
            match sim.spawn_vm(*host, 500., 2, 50., 4096, &[]) {
                Ok(vm) => vms.push(vm),
                Err(e) => info!("VM is not spawned on host #{}: {}", host, e),
            }
        }
    }

    for _ in 0..args.task_count {
        let vm = *vms.choose(&mut rand).unwrap();
        let id = sim.new_task_id();
        let mut task = Task::new(id, rand.gen_range(100..=5000), rand.gen_range(16..=256));
        if rand.gen_bool(0.7) {
            let item = items.choose(&mut rand).unwrap().clone();
            task = task.with_io(rand.gen_range(10..=500), rand.gen_range(1..=2)).with_data_item(item);
        }
        let delay = rand.gen_range(0.0..50.0);
        let file_transfer_time = if rand.gen_bool(0.2) { rand.gen_range(0.0..2.0) } else { 0. };
        sim.submit_task(vm, task, delay, file_transfer_time).unwrap();
    }

    let t = Instant::now();
    if let Some(migrate_at) = args.migrate_at {
        sim.step_for_duration(migrate_at);
        let target = *hosts.last().unwrap();
        if let Err(e) = sim.migrate_vm(vms[0], target) {
            info!("VM #{} is not migrated: {}", vms[0], e);
        }
    }
    sim.step_until_no_events();
    let elapsed = t.elapsed().as_secs_f64();

    println!("{}", sim.stats().to_json().unwrap());
    println!(
        "Processed {} events in {:.2?}s ({:.0} events/s)",
        sim.event_count(),
        elapsed,
        sim.event_count() as f64 / elapsed
    );
}
