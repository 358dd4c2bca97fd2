use colored::Colorize;
use flotilla_cloud_azure::network;
use flotilla_config::naming;
use std::path::Path;

pub async fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());

    let settings = match super::load_settings(config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    let vm_resource = &settings.virtual_machines;

    // ルールの組み立てでプロトコルも検証される
    let rules = match network::inbound_security_rules(vm_resource) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!(
        "  リソースグループ: {} ({})",
        vm_resource.resource_group.cyan(),
        vm_resource.location
    );
    println!(
        "  仮想ネットワーク: {} / サブネット: {}",
        vm_resource.virtual_network.name.cyan(),
        vm_resource.virtual_network.subnet_name.cyan()
    );
    println!(
        "  仮想マシン: {}台 ({})",
        vm_resource.vm_count, vm_resource.vm_size
    );
    for offset in 0..vm_resource.vm_count {
        let public_ip = if vm_resource.public_ip.enabled {
            naming::public_ip_name(vm_resource, offset)
        } else {
            "(なし)".to_string()
        };
        println!(
            "    - {} (hostname: {}, nic: {}, pip: {})",
            naming::virtual_machine_name(vm_resource, offset).cyan(),
            naming::hostname(vm_resource, offset),
            naming::network_interface_name(vm_resource, offset),
            public_ip
        );
    }

    if rules.is_empty() {
        println!("  ネットワークセキュリティグループ: (受信ルールなし)");
    } else {
        println!(
            "  ネットワークセキュリティグループ: {}",
            naming::network_security_group_name(vm_resource).cyan()
        );
        for rule in &rules {
            println!(
                "    - {} (priority: {}, {} {} from {})",
                rule.name.cyan(),
                rule.properties.priority,
                rule.properties.protocol,
                rule.properties.destination_port_range,
                rule.properties.source_address_prefix
            );
        }
    }

    Ok(())
}
