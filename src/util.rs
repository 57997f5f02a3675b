//! Small vector helpers. Weights are multi-dimensional everywhere, so most of the arithmetic in
//! the crate is element-wise over `&[f32]`.

pub type Matrix<T> = Vec<Vec<T>>;

/// a += b
#[inline]
pub fn add_assign(a: &mut [f32], b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter_mut().zip(b) {
        *x += *y;
    }
}

/// a -= b
#[inline]
pub fn sub_assign(a: &mut [f32], b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter_mut().zip(b) {
        *x -= *y;
    }
}

#[inline]
pub fn add(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

#[inline]
pub fn sub(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// true if every a[i] <= b[i]
#[inline]
pub fn all_le(a: &[f32], b: &[f32]) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y)
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn scale(a: &[f32], factor: f32) -> Vec<f32> {
    a.iter().map(|x| x * factor).collect()
}

/// divides every entry by `divisor`; zero divisors leave the vector untouched
pub fn divide(a: &[f32], divisor: f32) -> Vec<f32> {
    if divisor == 0.0 {
        return a.to_vec();
    }
    a.iter().map(|x| x / divisor).collect()
}

/// weighted euclidean distance between a and b
pub fn weighted_dist(a: &[f32], b: &[f32], factors: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .zip(factors)
        .map(|((x, y), f)| f * (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// column sums of a weight matrix
pub fn column_sums(m: &[Vec<f32>], dims: usize) -> Vec<f32> {
    let mut total = vec![0.0; dims];
    for row in m {
        add_assign(&mut total, row);
    }
    total
}

pub fn vec_string(v: &[f32]) -> String {
    v.iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns per-row counts in `a[..n]` into CSR offsets, with `a[n]` receiving the total. `a` must have
/// `n + 1` entries.
#[inline]
pub fn make_csr(n: usize, a: &mut [usize]) {
    assert!(n < a.len(), "making a csr indexes up to n");
    if n == 0 {
        a[0] = 0;
        return;
    }

    for i in 1..n {
        a[i] += a[i - 1];
    }
    for i in (1..=n).rev() {
        a[i] = a[i - 1];
    }
    a[0] = 0;
}

/// Builds the transposed incidence of a CSR structure: for each of `m` targets, the rows that
/// reference it, in ascending row order.
pub fn transpose_csr(ptr: &[usize], ind: &[usize], m: usize) -> (Vec<usize>, Vec<usize>) {
    let mut tptr = vec![0; m + 1];
    for &t in ind {
        tptr[t] += 1;
    }
    make_csr(m, &mut tptr);
    tptr[m] = ind.len();

    let mut fill = tptr.clone();
    let mut tind = vec![0; ind.len()];
    for row in 0..ptr.len().saturating_sub(1) {
        for &t in &ind[ptr[row]..ptr[row + 1]] {
            tind[fill[t]] = row;
            fill[t] += 1;
        }
    }
    (tptr, tind)
}

/// Drop repeated entries inside every row of a CSR whose rows are sorted.
pub fn dedup_csr_rows(ptr: &[usize], ind: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut nptr = Vec::with_capacity(ptr.len());
    let mut nind = Vec::with_capacity(ind.len());
    nptr.push(0);
    for w in ptr.windows(2) {
        let start = nind.len();
        for &x in &ind[w[0]..w[1]] {
            if nind.len() == start || nind.last() != Some(&x) {
                nind.push(x);
            }
        }
        nptr.push(nind.len());
    }
    (nptr, nind)
}

/// every block lies within `[lower, upper]`
pub fn within_bounds(balance: &[Vec<f32>], upper: &[Vec<f32>], lower: &[Vec<f32>]) -> bool {
    balance
        .iter()
        .zip(upper.iter().zip(lower))
        .all(|(b, (u, l))| all_le(b, u) && all_le(l, b))
}
