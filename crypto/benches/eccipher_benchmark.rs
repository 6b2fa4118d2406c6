//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use criterion::*;
use crypto::eccipher::gen_scalar;
use crypto::eccipher::ECCipher;
use crypto::eccipher::ECRistrettoParallel;
use crypto::eccipher::ECRistrettoSequential;

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}", 1000 + i)).collect()
}

fn parallel_hash_encrypt(n: usize, c: &mut Criterion) {
    let cipher = ECRistrettoParallel::new();
    let key = gen_scalar();
    let data = ids(n);
    c.bench_function(
        format!("ristretto parallel hash+enc, size: {}", n).as_str(),
        move |b| {
            b.iter_batched(
                || data.clone(),
                |ctx| cipher.hash_encrypt_to_bytes(&ctx, &key),
                BatchSize::SmallInput,
            )
        },
    );
}

fn sequential_hash_encrypt(n: usize, c: &mut Criterion) {
    let cipher = ECRistrettoSequential::new();
    let key = gen_scalar();
    let data = ids(n);
    c.bench_function(
        format!("ristretto sequential hash+enc, size: {}", n).as_str(),
        move |b| {
            b.iter_batched(
                || data.clone(),
                |ctx| cipher.hash_encrypt_to_bytes(&ctx, &key),
                BatchSize::SmallInput,
            )
        },
    );
}

fn parallel_reencrypt(n: usize, c: &mut Criterion) {
    let cipher = ECRistrettoParallel::new();
    let payload = cipher.hash_encrypt_to_bytes(&ids(n), &gen_scalar());
    let key = gen_scalar();
    c.bench_function(
        format!("ristretto parallel decompress+enc+compress, size: {}", n).as_str(),
        move |b| {
            b.iter_batched(
                || payload.clone(),
                |ctx| {
                    let points = cipher.to_points_encrypt(&ctx, &key).unwrap();
                    cipher.to_bytes(&points)
                },
                BatchSize::SmallInput,
            )
        },
    );
}

fn hash_encrypt_x1000(c: &mut Criterion) {
    sequential_hash_encrypt(1000, c);
    parallel_hash_encrypt(1000, c);
}

fn reencrypt_x1000(c: &mut Criterion) {
    parallel_reencrypt(1000, c);
}

criterion_group!(
name = ristretto;
config = Criterion::default()
        .sample_size(10)
        .nresamples(10);
targets = hash_encrypt_x1000, reencrypt_x1000
);

criterion_main!(ristretto);
