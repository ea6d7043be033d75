use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

static MATRIX_OPS: AtomicUsize = AtomicUsize::new(0);

pub fn reset_matrix_ops() {
    MATRIX_OPS.store(0, Ordering::SeqCst);
}

/// Number of matrix products issued since the last reset.
pub fn matrix_ops_count() -> usize {
    MATRIX_OPS.load(Ordering::SeqCst)
}

pub(crate) fn inc_ops() {
    MATRIX_OPS.fetch_add(1, Ordering::SeqCst);
}

/// Dense row-major matrix used as the im2col workspace for convolutions.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(r: usize, c: usize) -> Self {
        Matrix {
            rows: r,
            cols: c,
            data: vec![0.0; r * c],
        }
    }

    pub fn from_vec(r: usize, c: usize, v: Vec<f32>) -> Self {
        assert_eq!(v.len(), r * c);
        Matrix {
            rows: r,
            cols: c,
            data: v,
        }
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.cols + c] = v;
    }

    pub fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
        assert_eq!(a.cols, b.rows);
        let out = gemm(&a.data, a.rows, a.cols, &b.data, b.cols);
        Matrix::from_vec(a.rows, b.cols, out)
    }

    pub fn transpose(&self) -> Matrix {
        let mut v = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                v[j * self.rows + i] = self.get(i, j);
            }
        }
        Matrix::from_vec(self.cols, self.rows, v)
    }
}

/// `(m x k) * (k x n)` over raw row-major slices.
///
/// Output rows are independent, so they are computed in parallel. The inner
/// loop runs in `i-k-j` order to stream through `b` row by row.
pub fn gemm(a: &[f32], m: usize, k: usize, b: &[f32], n: usize) -> Vec<f32> {
    inc_ops();
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(i, out_row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (kk, &a_val) in a_row.iter().enumerate() {
            let b_row = &b[kk * n..(kk + 1) * n];
            for (o, &bv) in out_row.iter_mut().zip(b_row) {
                *o += a_val * bv;
            }
        }
    });
    out
}
