//! Criterion benchmarks for codemap-core.
//!
//! ## Benchmark groups
//!
//! 1. **analysis**: Element extraction per language, syntax trees on and off.
//! 2. **embedding**: Signature feature hashing and cosine similarity.
//! 3. **index**: Full in-memory build and a single-file incremental apply.
//! 4. **queries**: Keyword search, similarity and outline on a synthetic repo.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/codemap-core/Cargo.toml -- queries
//! ```

use std::path::Path;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use codemap_core::indexer::analyzer::{analyze_source, SourceFile};
use codemap_core::indexer::embedding::{cosine_similarity, embed_signature};
use codemap_core::indexer::extract::ExtractorRegistry;
use codemap_core::models::FileAnalysis;
use codemap_core::query::search::{keyword_search, similar_elements};
use codemap_core::query::structure::repository_outline;
use codemap_core::store::RepositoryIndex;

const TYPESCRIPT_SOURCE: &str = r#"
import { Request, Response } from 'express';
import { UserRepository } from './user-repository';

export interface UserDto {
  id: string;
  name: string;
}

export class UserService {
  constructor(private readonly repo: UserRepository) {}

  async findUser(id: string): Promise<UserDto | undefined> {
    if (!id) {
      return undefined;
    }
    return this.repo.load(id);
  }
}

export function handleGetUser(req: Request, res: Response) {
  const service = new UserService(new UserRepository());
  return service.findUser(req.params.id);
}

export const DEFAULT_PAGE_SIZE = 50;
"#;

const PYTHON_SOURCE: &str = r#"
import os
from .models import User

class UserService:
    def __init__(self, repo):
        self.repo = repo

    def find_user(self, user_id):
        if not user_id:
            return None
        return self.repo.load(user_id)

def load_config(path):
    with open(path) as handle:
        return handle.read()
"#;

const GO_SOURCE: &str = r#"
package service

import "fmt"

type UserService struct {
	repo Repository
}

func NewUserService(repo Repository) *UserService {
	return &UserService{repo: repo}
}

func (s *UserService) FindUser(id string) (*User, error) {
	if id == "" {
		return nil, fmt.Errorf("empty id")
	}
	return s.repo.Load(id)
}
"#;

const JAVA_SOURCE: &str = r#"
package com.example.service;

import java.util.Optional;

public class UserService {
    private final UserRepository repo;

    public UserService(UserRepository repo) {
        this.repo = repo;
    }

    public Optional<User> findUser(String id) {
        if (id == null) {
            return Optional.empty();
        }
        return repo.load(id);
    }
}
"#;

fn analyze(registry: &ExtractorRegistry, path: &str, text: &str) -> FileAnalysis {
    let root = Path::new("/bench");
    let source = SourceFile::from_bytes(root, &root.join(path), text.as_bytes(), Utc::now()).unwrap();
    analyze_source(&source, registry)
}

/// `n_files` TypeScript modules importing their predecessor.
fn synthetic_repo(n_files: usize) -> Vec<FileAnalysis> {
    let registry = ExtractorRegistry::with_defaults(false);
    (0..n_files)
        .map(|i| {
            let mut text = String::new();
            if i > 0 {
                text.push_str(&format!("import {{ handler{} }} from './mod{}';\n\n", i - 1, i - 1));
            }
            text.push_str(&format!(
                "export function handler{i}(request: Request) {{\n  return handler{}(request);\n}}\n\n\
                 export class Service{i} {{\n  loadUser(id: string) {{\n    return id;\n  }}\n}}\n\n\
                 export const LIMIT_{i} = {i};\n",
                i.saturating_sub(1)
            ));
            analyze(&registry, &format!("src/mod{i}.ts"), &text)
        })
        .collect()
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    let sources = [
        ("typescript", "src/service/user-service.ts", TYPESCRIPT_SOURCE),
        ("python", "app/service.py", PYTHON_SOURCE),
        ("go", "pkg/service/user.go", GO_SOURCE),
        ("java", "src/com/example/service/UserService.java", JAVA_SOURCE),
    ];
    for syntax_trees in [true, false] {
        let registry = ExtractorRegistry::with_defaults(syntax_trees);
        let mode = if syntax_trees { "tree" } else { "regex" };
        for (language, path, text) in sources {
            group.bench_function(BenchmarkId::new(mode, language), |b| {
                b.iter(|| black_box(analyze(&registry, path, black_box(text))));
            });
        }
    }
    group.finish();
}

fn bench_embedding(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedding");
    let signature = "export async function findUserById(userId: string, options?: LoadOptions)";
    group.bench_function("embed_signature/128", |b| {
        b.iter(|| embed_signature(black_box(signature), 128));
    });
    let a = embed_signature(signature, 128);
    let other = embed_signature("def load_user_by_id(user_id, options=None)", 128);
    group.bench_function("cosine_similarity/128", |b| {
        b.iter(|| cosine_similarity(black_box(&a), black_box(&other)));
    });
    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    for n in [50usize, 200] {
        let files = synthetic_repo(n);
        group.bench_with_input(BenchmarkId::new("build", n), &files, |b, files| {
            b.iter(|| RepositoryIndex::build(Path::new("/bench"), files.clone(), &[], None, 128));
        });
    }

    let files = synthetic_repo(200);
    let index = RepositoryIndex::build(Path::new("/bench"), files, &[], None, 128);
    let registry = ExtractorRegistry::with_defaults(false);
    let edited = analyze(
        &registry,
        "src/mod100.ts",
        "import { handler99 } from './mod99';\n\nexport function renamed() {\n  return handler99();\n}\n",
    );
    group.bench_function("apply_single_file/200", |b| {
        b.iter(|| {
            let mut index = index.clone();
            black_box(index.apply_changes(vec![edited.clone()], &[]))
        });
    });
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let index = RepositoryIndex::build(Path::new("/bench"), synthetic_repo(500), &[], None, 128);
    let elements = &index.semantic_index.elements;

    group.bench_function("keyword_search/name", |b| {
        b.iter(|| keyword_search(elements.values(), black_box("handler"), 20));
    });
    group.bench_function("keyword_search/signature", |b| {
        b.iter(|| keyword_search(elements.values(), black_box("request id"), 20));
    });
    group.bench_function("similar_elements", |b| {
        b.iter(|| similar_elements(&index.semantic_index, black_box("src/mod0.ts#handler0@1"), 10));
    });
    group.bench_function("outline", |b| {
        b.iter(|| repository_outline(&index, black_box("src"), true, 500));
    });
    group.finish();
}

criterion_group!(benches, bench_analysis, bench_embedding, bench_index, bench_queries);
criterion_main!(benches);
