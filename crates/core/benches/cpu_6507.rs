use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vcs_core::cpu_6507::{Bus6507, Cpu6507};

/// Simple memory implementation for benchmarking
struct BenchMemory {
    ram: Vec<u8>,
}

impl BenchMemory {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];

        // Reset vector to 0xF000
        ram[0xFFFC] = 0x00;
        ram[0xFFFD] = 0xF0;

        // A tight kernel-style loop:
        // LDA #$42 ; A9 42
        ram[0xF000] = 0xA9;
        ram[0xF001] = 0x42;
        // STA $0280 ; 8D 80 02
        ram[0xF002] = 0x8D;
        ram[0xF003] = 0x80;
        ram[0xF004] = 0x02;
        // LDX #$10 ; A2 10
        ram[0xF005] = 0xA2;
        ram[0xF006] = 0x10;
        // INX ; E8
        ram[0xF007] = 0xE8;
        // DEX ; CA
        ram[0xF008] = 0xCA;
        // ADC #$01 ; 69 01
        ram[0xF009] = 0x69;
        ram[0xF00A] = 0x01;
        // JMP $F000 ; 4C 00 F0
        ram[0xF00B] = 0x4C;
        ram[0xF00C] = 0x00;
        ram[0xF00D] = 0xF0;

        Self { ram }
    }
}

impl Bus6507 for BenchMemory {
    fn read(&mut self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }
}

fn bench_cpu_bus_cycles(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_6507_bus_cycles");

    for cycle_count in [100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(cycle_count),
            cycle_count,
            |b, &count| {
                b.iter(|| {
                    let mut mem = BenchMemory::new();
                    let mut cpu = Cpu6507::new();
                    cpu.reset(&mut mem);
                    for _ in 0..count {
                        cpu.step(&mut mem);
                    }
                    black_box(cpu.cycles);
                });
            },
        );
    }

    group.finish();
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_6507_reset", |b| {
        let mut mem = BenchMemory::new();
        let mut cpu = Cpu6507::new();
        b.iter(|| {
            cpu.reset(&mut mem);
            black_box(cpu.pc);
        });
    });
}

criterion_group!(benches, bench_cpu_bus_cycles, bench_cpu_reset);
criterion_main!(benches);
