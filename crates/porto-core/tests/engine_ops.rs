//! End-to-end property engine scenarios.

mod common;

use common::{alice, builder, engine, engine_with_clock, pids, root, FakeCgroups, FakeNet};
use porto_core::kernel::KernelFeatures;

// =============================================================================
// Guarantee Accounting
// =============================================================================

#[test]
fn test_memory_guarantee_exhaustion() {
    // 10 GiB total, 1 GiB reserve: two 5 GiB guarantees cannot coexist
    let engine = engine();
    let root = root();

    engine.create_container("a", &root).unwrap();
    engine
        .set_property("a", "memory_guarantee", "5G", &root)
        .unwrap();

    engine.create_container("b", &root).unwrap();
    let err = engine
        .set_property("b", "memory_guarantee", "5G", &root)
        .unwrap_err();
    assert_err_kind!(Err::<(), _>(err.clone()), ResourceNotAvailable);
    assert!(
        err.to_string().contains("4294967296 bytes"),
        "message must report the remaining budget: {err}"
    );

    // the failed set left nothing behind
    assert_eq!(
        engine.get_property("b", "memory_guarantee", &root).unwrap(),
        "0"
    );
    assert_eq!(
        engine.get_property("b", "mem_total_guarantee", &root).unwrap(),
        "0"
    );

    // a smaller guarantee still fits
    engine
        .set_property("b", "memory_guarantee", "4G", &root)
        .unwrap();
}

#[test]
fn test_guarantee_subtree_takes_max() {
    let engine = engine();
    let root = root();
    engine.create_container("a", &root).unwrap();
    engine.create_container("a/b", &root).unwrap();
    engine
        .set_property("a/b", "memory_guarantee", "2G", &root)
        .unwrap();
    engine
        .set_property("a", "memory_guarantee", "3G", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("a", "mem_total_guarantee", &root).unwrap(),
        (3u64 << 30).to_string()
    );
}

// =============================================================================
// State Gating
// =============================================================================

#[test]
fn test_dynamic_vs_stopped() {
    let engine = engine();
    let root = root();
    engine.create_container("c", &root).unwrap();

    engine.set_property("c", "isolate", "true", &root).unwrap();

    engine.on_start("c", pids(100)).unwrap();
    assert_eq!(engine.get_property("c", "state", &root).unwrap(), "running");

    assert_err_kind!(
        engine.set_property("c", "isolate", "false", &root),
        InvalidState
    );
    engine.set_property("c", "cpu_limit", "1c", &root).unwrap();
    assert_eq!(engine.get_property("c", "cpu_limit", &root).unwrap(), "1c");
}

#[test]
fn test_dead_state_rejects_everything_mutable() {
    let engine = engine();
    let root = root();
    engine.create_container("d", &root).unwrap();
    engine.on_start("d", pids(7)).unwrap();
    engine.on_exit("d", 0, false).unwrap();

    assert_err_kind!(
        engine.set_property("d", "cpu_limit", "1c", &root),
        InvalidState
    );
    assert_err_kind!(
        engine.set_property("d", "respawn", "true", &root),
        InvalidState
    );
    assert_eq!(engine.get_property("d", "exit_code", &root).unwrap(), "0");
}

#[test]
fn test_dead_only_observables() {
    let engine = engine();
    let root = root();
    engine.create_container("d", &root).unwrap();

    assert_err_kind!(engine.get_property("d", "oom_killed", &root), InvalidState);
    assert_err_kind!(engine.get_property("d", "exit_status", &root), InvalidState);

    engine.on_start("d", pids(7)).unwrap();
    // killed by SIGKILL
    engine.on_exit("d", 9, false).unwrap();
    assert_eq!(engine.get_property("d", "exit_status", &root).unwrap(), "9");
    assert_eq!(engine.get_property("d", "exit_code", &root).unwrap(), "-9");
    assert_eq!(
        engine.get_property("d", "oom_killed", &root).unwrap(),
        "false"
    );
}

#[test]
fn test_oom_exit_code() {
    let engine = engine();
    let root = root();
    engine.create_container("o", &root).unwrap();
    engine.on_start("o", pids(7)).unwrap();
    engine.on_exit("o", 9, true).unwrap();
    assert_eq!(engine.get_property("o", "exit_code", &root).unwrap(), "-99");
    assert_eq!(engine.get_property("o", "oom_killed", &root).unwrap(), "true");
}

// =============================================================================
// Capabilities
// =============================================================================

#[test]
fn test_capability_clamp_by_ancestor() {
    let engine = engine();
    let root = root();
    let alice = alice();

    engine.create_container("p", &root).unwrap();
    engine
        .set_property("p", "capabilities", "NET_ADMIN", &root)
        .unwrap();
    engine.create_container("p/c", &alice).unwrap();

    let before = engine.get_property("p/c", "capabilities", &alice).unwrap();
    assert_err_kind!(
        engine.set_property("p/c", "capabilities", "NET_ADMIN;SYS_ADMIN", &alice),
        Permission
    );
    // failed set is invisible
    assert_eq!(
        engine.get_property("p/c", "capabilities", &alice).unwrap(),
        before
    );
}

#[test]
fn test_capability_indexed_access() {
    let engine = engine();
    let root = root();
    engine.create_container("k", &root).unwrap();
    engine
        .set_property("k", "capabilities", "NET_ADMIN;KILL", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("k", "capabilities[KILL]", &root).unwrap(),
        "true"
    );
    assert_eq!(
        engine.get_property("k", "capabilities[SYS_ADMIN]", &root).unwrap(),
        "false"
    );
    engine
        .set_property("k", "capabilities[SYS_ADMIN]", "true", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("k", "capabilities[SYS_ADMIN]", &root).unwrap(),
        "true"
    );
}

#[test]
fn test_ambient_raises_limit() {
    let engine = engine();
    let root = root();
    engine.create_container("m", &root).unwrap();
    engine
        .set_property("m", "capabilities", "KILL", &root)
        .unwrap();
    engine
        .set_property("m", "capabilities_ambient", "NET_BIND_SERVICE", &root)
        .unwrap();
    // the limit was auto-raised to cover the ambient set
    assert_eq!(
        engine
            .get_property("m", "capabilities[NET_BIND_SERVICE]", &root)
            .unwrap(),
        "true"
    );
}

#[test]
fn test_unsupported_property_rejects_everything() {
    let engine = builder()
        .features(KernelFeatures {
            ambient_caps: false,
            ..KernelFeatures::all()
        })
        .build();
    let root = root();
    engine.create_container("u", &root).unwrap();

    assert_err_kind!(
        engine.get_property("u", "capabilities_ambient", &root),
        NotSupported
    );
    assert_err_kind!(
        engine.set_property("u", "capabilities_ambient", "KILL", &root),
        NotSupported
    );
    assert_err_kind!(engine.get_property("u", "net_tos", &root), NotSupported);
}

// =============================================================================
// Indexed Maps
// =============================================================================

#[test]
fn test_indexed_env_preserves_order() {
    let engine = engine();
    let root = root();
    engine.create_container("e", &root).unwrap();
    engine.set_property("e", "env", "A=1;B=2", &root).unwrap();
    assert_eq!(engine.get_property("e", "env[B]", &root).unwrap(), "2");
    engine.set_property("e", "env[B]", "3", &root).unwrap();
    assert_eq!(engine.get_property("e", "env", &root).unwrap(), "A=1;B=3");
}

#[test]
fn test_indexed_map_empty_value_removes() {
    let engine = engine();
    let root = root();
    engine.create_container("n", &root).unwrap();
    engine
        .set_property("n", "net_limit", "eth0: 1M; default: 2M", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("n", "net_limit[eth0]", &root).unwrap(),
        (1 << 20).to_string()
    );
    engine.set_property("n", "net_limit[eth0]", "", &root).unwrap();
    assert_err_kind!(engine.get_property("n", "net_limit[eth0]", &root), InvalidValue);
    assert_eq!(
        engine.get_property("n", "net_limit", &root).unwrap(),
        format!("default: {}", 2 << 20)
    );
}

#[test]
fn test_net_priority_range() {
    let engine = engine();
    let root = root();
    engine.create_container("n", &root).unwrap();
    engine
        .set_property("n", "net_priority", "default: 7", &root)
        .unwrap();
    assert_err_kind!(
        engine.set_property("n", "net_priority", "default: 8", &root),
        InvalidValue
    );
    assert_err_kind!(
        engine.set_property("n", "net_priority[eth0]", "9", &root),
        InvalidValue
    );
}

#[test]
fn test_ulimit_round_trip() {
    let engine = engine();
    let root = root();
    engine.create_container("u", &root).unwrap();
    engine
        .set_property("u", "ulimit", "nofile: 1024 4096; core: 0 unlimited", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("u", "ulimit", &root).unwrap(),
        "core: 0 unlimited; nofile: 1024 4096"
    );
    assert_eq!(
        engine.get_property("u", "ulimit[nofile]", &root).unwrap(),
        "1024 4096"
    );
    engine.set_property("u", "ulimit[core]", "", &root).unwrap();
    assert_err_kind!(engine.get_property("u", "ulimit[core]", &root), InvalidValue);
    assert_err_kind!(
        engine.set_property("u", "ulimit", "files: 1 2", &root),
        InvalidValue
    );
}

// =============================================================================
// Net Class Id
// =============================================================================

#[test]
fn test_net_class_id_lists_managed_devices() {
    let engine = builder()
        .network(FakeNet {
            devices: vec![
                ("eth0".to_string(), true),
                ("eth1".to_string(), true),
                ("lo".to_string(), false),
            ],
            stats: Default::default(),
        })
        .build();
    let root = root();
    engine.create_container("n", &root).unwrap();
    engine.assign_net_class("n", 0x0001_0002).unwrap();
    engine.on_start("n", pids(5)).unwrap();

    assert_eq!(
        engine.get_property("n", "net_class_id", &root).unwrap(),
        "eth0: 1:2; eth1: 1:2"
    );
    assert_eq!(
        engine.get_property("n", "net_class_id[eth0]", &root).unwrap(),
        "1:2"
    );
    assert_err_kind!(
        engine.get_property("n", "net_class_id[lo]", &root),
        InvalidProperty
    );
}

// =============================================================================
// Controllers
// =============================================================================

#[test]
fn test_controllers_freeze_after_start() {
    let engine = engine();
    let root = root();
    engine.create_container("t", &root).unwrap();
    engine.on_start("t", pids(9)).unwrap();

    // pids controller was never attached while stopped
    assert_err_kind!(
        engine.set_property("t", "thread_limit", "100", &root),
        NotSupported
    );

    engine.create_container("s", &root).unwrap();
    engine.set_property("s", "thread_limit", "100", &root).unwrap();
    engine.on_start("s", pids(10)).unwrap();
    // already attached, runtime updates pass
    engine.set_property("s", "thread_limit", "50", &root).unwrap();
    assert!(engine
        .get_property("s", "cgroups", &root)
        .unwrap()
        .contains("pids"));
}

#[test]
fn test_hugetlb_shrink_below_usage() {
    let engine = builder()
        .cgroups(FakeCgroups {
            huge: 4096,
            ..FakeCgroups::default()
        })
        .build();
    let root = root();
    engine.create_container("h", &root).unwrap();
    engine.set_property("h", "hugetlb_limit", "1M", &root).unwrap();
    engine.on_start("h", pids(11)).unwrap();

    assert_err_kind!(
        engine.set_property("h", "hugetlb_limit", "1K", &root),
        InvalidValue
    );
    engine.set_property("h", "hugetlb_limit", "2M", &root).unwrap();

    // thread_limit below usage is the kernel's problem, not ours
    engine.create_container("t", &root).unwrap();
    engine.set_property("t", "thread_limit", "1", &root).unwrap();
}

// =============================================================================
// Permissions
// =============================================================================

#[test]
fn test_cpu_limit_parent_clamp() {
    let engine = engine();
    let root = root();
    let alice = alice();
    engine.create_container("a", &alice).unwrap();
    engine.set_property("a", "cpu_limit", "2c", &root).unwrap();
    engine.create_container("a/b", &alice).unwrap();

    assert_err_kind!(
        engine.set_property("a/b", "cpu_limit", "3c", &alice),
        InvalidValue
    );
    engine.set_property("a/b", "cpu_limit", "3c", &root).unwrap();
}

#[test]
fn test_access_level_clamp() {
    let engine = engine();
    let root = root();
    let alice = alice();
    engine.create_container("p", &alice).unwrap();
    engine
        .set_property("p", "enable_porto", "read-only", &alice)
        .unwrap();
    engine.create_container("p/c", &alice).unwrap();

    assert_err_kind!(
        engine.set_property("p/c", "enable_porto", "true", &alice),
        Permission
    );
    engine
        .set_property("p/c", "enable_porto", "child-only", &alice)
        .unwrap();
    // the superuser may always raise
    engine.set_property("p/c", "enable_porto", "true", &root).unwrap();
}

#[test]
fn test_user_change_permission() {
    let engine = engine();
    let alice = alice();
    engine.create_container("w", &alice).unwrap();

    assert_err_kind!(engine.set_property("w", "user", "bob", &alice), Permission);
    engine.set_property("w", "user", "alice", &alice).unwrap();
    assert_eq!(engine.get_property("w", "user", &alice).unwrap(), "alice");

    let root = root();
    engine.set_property("w", "user", "bob", &root).unwrap();
    assert_eq!(engine.get_property("w", "user", &root).unwrap(), "bob");
}

#[test]
fn test_group_preserved_when_member() {
    let engine = engine();
    let root = root();
    engine.create_container("g", &root).unwrap();
    engine.set_property("g", "group", "staff", &root).unwrap();
    // alice is a member of staff, so the gid survives the user switch
    engine.set_property("g", "user", "alice", &root).unwrap();
    assert_eq!(engine.get_property("g", "group", &root).unwrap(), "staff");
    // bob is not, his primary group takes over
    engine.set_property("g", "user", "bob", &root).unwrap();
    assert_eq!(engine.get_property("g", "group", &root).unwrap(), "bob");
}

#[test]
fn test_stdout_limit_clamped_for_mortals() {
    let engine = engine();
    let root = root();
    let alice = alice();
    engine.create_container("s", &alice).unwrap();
    assert_err_kind!(
        engine.set_property("s", "stdout_limit", "2G", &alice),
        InvalidValue
    );
    engine.set_property("s", "stdout_limit", "2G", &root).unwrap();
    engine.set_property("s", "stdout_limit", "16M", &alice).unwrap();
}

#[test]
fn test_root_container_is_immutable() {
    let engine = engine();
    let root = root();
    assert_err_kind!(
        engine.set_property("/", "memory_limit", "1G", &root),
        Permission
    );
    // reads are fine
    assert_eq!(engine.get_property("/", "state", &root).unwrap(), "meta");
}

// =============================================================================
// Misc Dispatch
// =============================================================================

#[test]
fn test_unknown_property() {
    let engine = engine();
    let root = root();
    engine.create_container("x", &root).unwrap();
    assert_err_kind!(
        engine.get_property("x", "no_such_prop", &root),
        InvalidProperty
    );
    assert_err_kind!(
        engine.set_property("x", "no_such_prop", "1", &root),
        InvalidProperty
    );
}

#[test]
fn test_read_only_rejects_writes() {
    let engine = engine();
    let root = root();
    engine.create_container("x", &root).unwrap();
    for prop in ["state", "exit_status", "absolute_name", "respawn_count"] {
        assert_err_kind!(engine.set_property("x", prop, "1", &root), InvalidValue);
    }
}

#[test]
fn test_non_indexable_property() {
    let engine = engine();
    let root = root();
    engine.create_container("x", &root).unwrap();
    assert_err_kind!(
        engine.get_property("x", "memory_limit[z]", &root),
        InvalidValue
    );
}

#[test]
fn test_absolute_names() {
    let engine = engine();
    let root = root();
    engine.create_container("a", &root).unwrap();
    engine.create_container("a/b", &root).unwrap();
    assert_eq!(
        engine.get_property("a/b", "absolute_name", &root).unwrap(),
        "/porto/a/b"
    );
    assert_eq!(engine.get_property("/", "absolute_name", &root).unwrap(), "/");
    assert_eq!(engine.get_property("a/b", "parent", &root).unwrap(), "a");

    engine.set_property("a", "porto_namespace", "a/", &root).unwrap();
    assert_eq!(
        engine
            .get_property("a/b", "absolute_namespace", &root)
            .unwrap(),
        "/porto/a/"
    );
}

#[test]
fn test_time_and_aging() {
    let (engine, clock) = engine_with_clock();
    let root = root();
    engine.create_container("t", &root).unwrap();
    engine.set_property("t", "aging_time", "10", &root).unwrap();
    assert_eq!(engine.get_property("t", "aging_time", &root).unwrap(), "10");

    engine.on_start("t", pids(3)).unwrap();
    clock.advance_ms(5_000);
    assert_eq!(engine.get_property("t", "time", &root).unwrap(), "5");

    engine.on_exit("t", 0, false).unwrap();
    clock.advance_ms(60_000);
    // time froze at death
    assert_eq!(engine.get_property("t", "time", &root).unwrap(), "5");

    let removed = engine.remove_aged();
    assert_eq!(removed, vec!["t".to_string()]);
    assert!(engine.get_property("t", "state", &root).is_err());
}

#[test]
fn test_io_limit_routing() {
    let engine = builder()
        .cgroups(FakeCgroups {
            disks: vec!["sda".to_string()],
            ..FakeCgroups::default()
        })
        .build();
    let root = root();
    engine.create_container("io", &root).unwrap();
    engine
        .set_property("io", "io_limit", "fs: 10M; sda: 20M", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("io", "io_limit[fs]", &root).unwrap(),
        (10 << 20).to_string()
    );
    assert_err_kind!(
        engine.set_property("io", "io_limit", "nvme9: 1M", &root),
        InvalidValue
    );
    engine.set_property("io", "io_limit[sda]", "", &root).unwrap();
    assert_err_kind!(engine.get_property("io", "io_limit[sda]", &root), InvalidValue);
}

#[test]
fn test_observables_from_backend() {
    let engine = builder()
        .cgroups(FakeCgroups {
            memory: 12345,
            anon: 2345,
            mem_stats: [
                ("total_pgfault".to_string(), 100u64),
                ("total_pgmajfault".to_string(), 10u64),
                ("total_max_rss".to_string(), 777u64),
            ]
            .into_iter()
            .collect(),
            cpu: 999,
            procs: 3,
            threads: 7,
            ..FakeCgroups::default()
        })
        .build();
    let root = root();
    engine.create_container("s", &root).unwrap();

    // nothing to observe while stopped
    assert_err_kind!(engine.get_property("s", "memory_usage", &root), InvalidState);

    engine.on_start("s", pids(4)).unwrap();
    assert_eq!(engine.get_property("s", "memory_usage", &root).unwrap(), "12345");
    assert_eq!(engine.get_property("s", "anon_usage", &root).unwrap(), "2345");
    assert_eq!(engine.get_property("s", "minor_faults", &root).unwrap(), "90");
    assert_eq!(engine.get_property("s", "major_faults", &root).unwrap(), "10");
    assert_eq!(engine.get_property("s", "max_rss", &root).unwrap(), "777");
    assert_eq!(engine.get_property("s", "cpu_usage", &root).unwrap(), "999");
    assert_eq!(engine.get_property("s", "process_count", &root).unwrap(), "3");
    assert_eq!(engine.get_property("s", "thread_count", &root).unwrap(), "7");
    assert_eq!(engine.get_property("s", "root_pid", &root).unwrap(), "4");
}

#[test]
fn test_porto_stat_counts() {
    let engine = engine();
    let root = root();
    engine.create_container("a", &root).unwrap();
    engine.create_container("b", &root).unwrap();
    engine.on_start("a", pids(1)).unwrap();

    assert_eq!(
        engine.get_property("/", "porto_stat[created]", &root).unwrap(),
        "2"
    );
    assert_eq!(
        engine.get_property("/", "porto_stat[running]", &root).unwrap(),
        "1"
    );
    assert_eq!(
        engine.get_property("/", "porto_stat[containers]", &root).unwrap(),
        "3"
    );
    assert_err_kind!(
        engine.get_property("/", "porto_stat[nope]", &root),
        InvalidValue
    );
}

#[test]
fn test_bind_and_devices_round_trip() {
    let engine = engine();
    let root = root();
    engine.create_container("b", &root).unwrap();
    engine
        .set_property("b", "bind", "/host /inside ro;/tmp /tmp rw", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("b", "bind", &root).unwrap(),
        "/host /inside ro;/tmp /tmp rw"
    );
    assert_err_kind!(
        engine.set_property("b", "bind", "/only-one-token", &root),
        InvalidValue
    );

    engine
        .set_property("b", "devices", "/dev/null rwm;/dev/kvm rw kvm", &root)
        .unwrap();
    assert_eq!(
        engine.get_property("b", "devices", &root).unwrap(),
        "/dev/null rwm;/dev/kvm rw kvm"
    );
}

#[test]
fn test_net_and_addresses() {
    let engine = engine();
    let root = root();
    engine.create_container("n", &root).unwrap();
    engine
        .set_property("n", "net", "macvlan eth0 eth0 bridge", &root)
        .unwrap();
    assert_err_kind!(
        engine.set_property("n", "net", "none;veth eth0 br0", &root),
        InvalidValue
    );
    engine
        .set_property("n", "ip", "eth0 192.168.1.5/24", &root)
        .unwrap();
    assert_err_kind!(
        engine.set_property("n", "ip", "eth0 nowhere", &root),
        InvalidValue
    );
    engine
        .set_property("n", "default_gw", "eth0 192.168.1.1", &root)
        .unwrap();
}

#[test]
fn test_virt_mode_expands_defaults() {
    let engine = engine();
    let root = root();
    let alice = alice();
    engine.create_container("v", &alice).unwrap();
    engine.set_property("v", "virt_mode", "os", &alice).unwrap();
    assert_eq!(engine.get_property("v", "virt_mode", &alice).unwrap(), "os");
    // os mode allows NET_ADMIN for non-root owners
    engine
        .set_property("v", "capabilities", "NET_ADMIN", &alice)
        .unwrap();
    assert_err_kind!(
        engine.set_property("v", "virt_mode", "vm", &alice),
        InvalidValue
    );
}
